use serde::de::DeserializeOwned;
use serde::Serialize;

/// Uniform binary encoding for every type that crosses the wire. Backed by
/// bincode so that a frame read back from the transport deserializes into
/// exactly the value that was written.
pub trait WireIO {
    /// Serializes the value to a byte vector
    fn serialize_to_vector(&self) -> Result<Vec<u8>, bincode::Error>
    where
        Self: Serialize,
    {
        bincode::serialize(self)
    }

    /// Deserializes a value from a byte slice
    fn deserialize_from_vector(input: &[u8]) -> Result<Self, bincode::Error>
    where
        Self: DeserializeOwned,
    {
        bincode::deserialize(input)
    }
}

impl<T: Serialize + DeserializeOwned> WireIO for T {}
