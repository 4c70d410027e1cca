//! Ports to the relay's collaborators.

pub mod outbound;

pub use outbound::{
    ManualTimeSource, SigningSecret, SigningSecretSource, SystemTimeSource, TimeSource,
};
