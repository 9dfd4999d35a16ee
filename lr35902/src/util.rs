// Serde only derives (de)serialization for arrays up to 32 elements, and its fallback for anything bigger encodes a
// sequence of individually tagged elements. We wrap the fixed-size memory regions in "glue" types so they serialize
// as a single byte blob instead, which keeps save states compact and fast to produce. The wrappers index and deref
// transparently, so the rest of the core treats them as plain byte slices.
#[macro_export]
macro_rules! memory_segment {
    ( $name:ident; $size:expr ) => {
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name([u8; $size]);

        impl Default for $name {
            fn default() -> $name {
                $name([0; $size])
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}([u8; {:#x}])", stringify!($name), $size)
            }
        }

        impl std::ops::Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &[u8] {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut [u8] {
                &mut self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct SegmentVisitor;

                impl<'de> serde::de::Visitor<'de> for SegmentVisitor {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                        write!(formatter, "a byte array of {} elements", $size)
                    }

                    fn visit_bytes<E>(self, value: &[u8]) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        if value.len() != $size {
                            return Err(E::custom(format!(
                                "expected byte array of {:x}, but this is {:x}",
                                $size,
                                value.len()
                            )));
                        }
                        let mut segment: $name = Default::default();
                        segment.0.copy_from_slice(value);
                        Ok(segment)
                    }

                    fn visit_byte_buf<E>(self, value: Vec<u8>) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        self.visit_bytes(&value)
                    }
                }

                deserializer.deserialize_bytes(SegmentVisitor)
            }
        }
    };
}

/// Splits a 16-bit value into its (high, low) bytes.
pub fn split16(v: u16) -> (u8, u8) {
    ((v >> 8) as u8, v as u8)
}

/// Joins (high, low) bytes into a 16-bit value.
pub fn join16(hi: u8, lo: u8) -> u16 {
    u16::from(hi) << 8 | u16::from(lo)
}
