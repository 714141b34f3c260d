use thiserror::Error;

#[derive(Error, Debug)]
pub enum HexError {
    #[error("invalid hex encoding")]
    InvalidEncoding(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },
}

/// Decodes an even-length string of hex digit pairs into bytes.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, HexError> {
    let bytes = hex::decode(input.trim())?;
    Ok(bytes)
}

/// Decodes a hex string into a fixed-size byte array, as used for the
/// EUIs and session keys of the LoRaWAN config.
pub fn decode_hex_array<const N: usize>(input: &str) -> Result<[u8; N], HexError> {
    let bytes = decode_hex(input)?;
    let got = bytes.len();
    bytes.try_into().map_err(|_| HexError::WrongLength { expected: N, got })
}

pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("26011BDA").unwrap(), vec![0x26, 0x01, 0x1B, 0xDA]);
        assert_eq!(decode_hex("00ff").unwrap(), vec![0x00, 0xFF]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(matches!(decode_hex("ABC"), Err(HexError::InvalidEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_non_hex_digits() {
        assert!(matches!(decode_hex("zz"), Err(HexError::InvalidEncoding(_))));
        assert!(matches!(decode_hex("12 4"), Err(HexError::InvalidEncoding(_))));
    }

    #[test]
    fn test_round_trip_is_case_normalized() {
        for input in ["26011BDA", "deadbeef", "00", "FFFFFFFFFFFFFFFF"] {
            let decoded = decode_hex(input).unwrap();
            assert_eq!(encode_hex(&decoded), input.to_lowercase());
        }
    }

    #[test]
    fn test_decode_hex_array() {
        let key: [u8; 4] = decode_hex_array("26011BDA").unwrap();
        assert_eq!(key, [0x26, 0x01, 0x1B, 0xDA]);

        let err = decode_hex_array::<16>("26011BDA").unwrap_err();
        assert!(matches!(err, HexError::WrongLength { expected: 16, got: 4 }));
    }
}
