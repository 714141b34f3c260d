use std::fmt;

use thiserror::Error;

use crate::reading::ResolvedReading;

/// Capacity of the transmit buffer, terminator included.
pub const PAYLOAD_CAPACITY: usize = 50;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("payload of {needed} bytes exceeds the {capacity} byte transmit buffer")]
pub struct TruncationError {
    pub needed: usize,
    pub capacity: usize,
}

/// Null-terminated ASCII uplink buffer holding
/// `serial,selector,unit,value`.
#[derive(Clone, Debug)]
pub struct UplinkPayload {
    buf: [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl UplinkPayload {
    /// Joins the reading fields with comma separators. The capacity check
    /// covers the terminator byte as well; an oversized reading fails
    /// instead of being cut short.
    pub fn format(
        serial: &str,
        selector: &str,
        unit: &str,
        value: &str,
    ) -> Result<Self, TruncationError> {
        let formatted = format!("{},{},{},{}", serial, selector, unit, value);
        let needed = formatted.len() + 1;
        if needed > PAYLOAD_CAPACITY {
            return Err(TruncationError { needed, capacity: PAYLOAD_CAPACITY });
        }

        let mut buf = [0u8; PAYLOAD_CAPACITY];
        buf[..formatted.len()].copy_from_slice(formatted.as_bytes());
        Ok(UplinkPayload { buf, len: formatted.len() })
    }

    pub fn from_reading(reading: &ResolvedReading) -> Result<Self, TruncationError> {
        Self::format(&reading.serial, &reading.selector, &reading.unit, &reading.value)
    }

    /// Transmitted bytes, terminator excluded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for UplinkPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::str::from_utf8(self.as_bytes()).unwrap_or("<invalid utf-8>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_joins_fields() {
        let payload = UplinkPayload::format("12345678", "1.2.3", "m3", "00042").unwrap();
        assert_eq!(payload.as_bytes(), b"12345678,1.2.3,m3,00042");
        assert_eq!(payload.to_string(), "12345678,1.2.3,m3,00042");
        assert_eq!(payload.len(), 23);
    }

    #[test]
    fn test_buffer_is_terminated() {
        let payload = UplinkPayload::format("1", "2", "3", "4").unwrap();
        assert_eq!(payload.buf[payload.len], 0);
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        // 49 characters of fields plus the terminator fill the buffer.
        let serial = "123456789012345678901234567890123456789012345";
        let payload = UplinkPayload::format(serial, "1", "", "").unwrap();
        assert_eq!(payload.len(), PAYLOAD_CAPACITY - 1);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let serial = "1234567890123456789012345678901234567890123456";
        let err = UplinkPayload::format(serial, "1", "", "").unwrap_err();
        assert_eq!(err, TruncationError { needed: PAYLOAD_CAPACITY + 1, capacity: PAYLOAD_CAPACITY });
    }

    #[test]
    fn test_from_reading() {
        let resolved = crate::reading::ResolvedReading {
            serial: "12345678".to_string(),
            selector: "1.2.3".to_string(),
            value: "00042".to_string(),
            unit: "m3".to_string(),
        };
        let payload = UplinkPayload::from_reading(&resolved).unwrap();
        assert_eq!(payload.to_string(), "12345678,1.2.3,m3,00042");
    }
}
