pub mod dev;
pub mod file;
pub mod ioctl;
