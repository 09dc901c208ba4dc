//! ioctl command encoding, `_IOC` layout:
//!
//! ```text
//!  31    30 29          16 15        8 7          0
//! +--------+--------------+-----------+------------+
//! |  dir   |     size     |   type    |     nr     |
//! +--------+--------------+-----------+------------+
//! ```

const NRBITS: u32 = 8;
const TYPEBITS: u32 = 8;
const SIZEBITS: u32 = 14;

const NRSHIFT: u32 = 0;
const TYPESHIFT: u32 = NRSHIFT + NRBITS;
const SIZESHIFT: u32 = TYPESHIFT + TYPEBITS;
const DIRSHIFT: u32 = SIZESHIFT + SIZEBITS;

pub const IOC_NONE: u32 = 0;
pub const IOC_WRITE: u32 = 1;
pub const IOC_READ: u32 = 2;

pub const fn ioc(dir: u32, ty: u8, nr: u8, size: u32) -> u32 {
    (dir << DIRSHIFT) | ((ty as u32) << TYPESHIFT) | ((nr as u32) << NRSHIFT) | (size << SIZESHIFT)
}

/// `_IO(type, nr)`: a command without payload.
pub const fn io(ty: u8, nr: u8) -> u32 {
    ioc(IOC_NONE, ty, nr, 0)
}

pub const fn ioc_dir(cmd: u32) -> u32 {
    cmd >> DIRSHIFT
}

pub const fn ioc_type(cmd: u32) -> u8 {
    (cmd >> TYPESHIFT) as u8
}

pub const fn ioc_nr(cmd: u32) -> u8 {
    (cmd >> NRSHIFT) as u8
}

pub const fn ioc_size(cmd: u32) -> u32 {
    (cmd >> SIZESHIFT) & ((1 << SIZEBITS) - 1)
}
