//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the access layer and the outside
//! world: the network, durable storage and token introspection. Each port
//! is a trait implemented by adapters in the infrastructure layer.

mod claims;
mod key_value;
mod transport;

pub use claims::{Claims, ClaimsDecoder, NoClaimsDecoder};
pub use key_value::{InMemoryKeyValueStore, KeyValueStore, StorageError};
pub use transport::{HttpTransport, TransportError};
