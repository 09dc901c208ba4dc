//! Platform back-ends for the [`hal`](crate::hal) traits.
//!
//! [`sim`] is always built. SoC back-ends are selected by Cargo feature and
//! only compiled for the architecture they drive:
//!
//! ```text
//! cargo build --features bcm2835 --target armv6zk-none-eabihf
//! ```

pub mod sim;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "bcm2835", target_arch = "arm"))] {
        pub mod bcm2835;
        pub use bcm2835::Bcm2835Gpio as BoardGpio;
    }
}
