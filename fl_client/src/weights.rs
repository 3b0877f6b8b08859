use comms::FeatureMap;

/// A named block of model weights as returned by the server.
///
/// Names are unique within one response only. The bytes are kept as received; decoding
/// them into numbers is up to the session backend that adopts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightBuffer {
    name: String,
    data: Vec<u8>,
}

impl WeightBuffer {
    /// Creates a new `WeightBuffer`.
    ///
    /// # Args
    /// * `name` - The full weight name, must be non-empty.
    /// * `data` - The raw weight bytes.
    ///
    /// # Returns
    /// `None` if `name` is empty.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Option<Self> {
        let name = name.into();
        if name.is_empty() {
            return None;
        }

        Some(Self { name, data })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl TryFrom<FeatureMap> for WeightBuffer {
    type Error = FeatureMap;

    fn try_from(value: FeatureMap) -> Result<Self, Self::Error> {
        if value.weight_fullname.is_empty() {
            return Err(value);
        }

        Ok(Self {
            name: value.weight_fullname,
            data: value.data,
        })
    }
}

impl From<WeightBuffer> for FeatureMap {
    fn from(value: WeightBuffer) -> Self {
        FeatureMap {
            weight_fullname: value.name,
            data: value.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_are_rejected() {
        assert!(WeightBuffer::new("", vec![1, 2]).is_none());

        let fm = FeatureMap {
            weight_fullname: String::new(),
            data: vec![0; 4],
        };
        assert!(WeightBuffer::try_from(fm).is_err());
    }

    #[test]
    fn byte_len_matches_data() {
        let w = WeightBuffer::new("fc.bias", vec![0; 12]).unwrap();
        assert_eq!(w.name(), "fc.bias");
        assert_eq!(w.byte_len(), 12);
    }
}
