//! Error taxonomy shared by the char-device layers.

use core::fmt;
use drivers::hal::gpio::GpioError;

/// Failure of a registration step or of a file operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DevError {
    /// Bad pin id, malformed payload, parameter or name.
    InvalidArgument,
    /// The hardware line is leased by someone else.
    ResourceBusy,
    /// No free dynamic minor or major left.
    ResourceExhausted,
    /// The number range or name is already taken.
    Conflict,
    /// The device number or namespace entry does not resolve.
    NotFound,
    /// The device is known but its hardware is gone.
    NoDevice,
    /// The underlying hardware operation failed.
    IoFailure,
    /// Unrecognized ioctl command or unsupported operation.
    NotSupported,
    /// The file was not opened for this kind of access.
    BadFile,
}

impl DevError {
    /// Negative errno, as a syscall would return it.
    pub const fn errno(self) -> i32 {
        let errno = match self {
            DevError::InvalidArgument => 22,   // EINVAL
            DevError::ResourceBusy => 16,      // EBUSY
            DevError::ResourceExhausted => 28, // ENOSPC
            DevError::Conflict => 17,          // EEXIST
            DevError::NotFound => 2,           // ENOENT
            DevError::NoDevice => 19,          // ENODEV
            DevError::IoFailure => 5,          // EIO
            DevError::NotSupported => 25,      // ENOTTY
            DevError::BadFile => 9,            // EBADF
        };
        -errno
    }
}

impl fmt::Display for DevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DevError::InvalidArgument => "invalid argument",
            DevError::ResourceBusy => "resource busy",
            DevError::ResourceExhausted => "no space left",
            DevError::Conflict => "already exists",
            DevError::NotFound => "no such device or entry",
            DevError::NoDevice => "no such device",
            DevError::IoFailure => "i/o error",
            DevError::NotSupported => "inappropriate ioctl for device",
            DevError::BadFile => "bad file access mode",
        };
        f.write_str(msg)
    }
}

impl From<GpioError> for DevError {
    fn from(err: GpioError) -> Self {
        match err {
            GpioError::InvalidPin => DevError::InvalidArgument,
            GpioError::Busy => DevError::ResourceBusy,
            GpioError::NotRequested => DevError::NoDevice,
            GpioError::Io => DevError::IoFailure,
        }
    }
}

pub type Result<T, E = DevError> = core::result::Result<T, E>;
