#![forbid(unsafe_code)]
//! Core networking components for the VeilNET overlay
#![deny(
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    variant_size_differences,
    unused_features
)]

#[macro_use]
pub mod macros {
    macro_rules! inner {
        ($item:expr) => {
            $item.inner.read()
        };
    }

    macro_rules! inner_mut {
        ($item:expr) => {
            $item.inner.write()
        };
    }

    macro_rules! create_inner {
        ($item:expr) => {
            std::sync::Arc::new(parking_lot::RwLock::new($item))
        };
    }

    macro_rules! define_outer_struct_wrapper {
        ($struct_name:ident, $inner:ty) => {
            #[derive(Clone)]
            pub struct $struct_name {
                pub(crate) inner: std::sync::Arc<parking_lot::RwLock<$inner>>,
            }

            impl From<$inner> for $struct_name {
                fn from(inner: $inner) -> Self {
                    Self {
                        inner: create_inner!(inner),
                    }
                }
            }
        };
    }

    #[allow(unused_results)]
    macro_rules! spawn {
        ($future:expr) => {
            std::mem::drop(tokio::spawn($future))
        };
    }
}

pub mod prelude {
    pub use veilnet_crypt::prelude::*;
    pub use veilnet_ledger::prelude::*;
    pub use veilnet_types::proto::{Envelope, EnvelopeType, SessionId};
    pub use veilnet_types::serialization::WireIO;

    pub use crate::constants::*;
    pub use crate::error::NetworkError;
    pub use crate::proto::client::{ClientConfig, ClientEvent, VeilnetClient};
    pub use crate::proto::node::{ServerConfig, VeilnetServer};
    pub use crate::proto::router::{Router, RoutingOutcome};
    pub use crate::proto::session::{ClientSession, SessionState};
    pub use crate::proto::session_manager::SessionManager;
}

/// Contains the constants used by this crate
pub mod constants;
/// The default error type for this crate
mod error;
/// The primary module of this crate
mod proto;
