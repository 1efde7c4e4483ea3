//! Wire format of the scale's weight notifications and command frames.

use crate::error::DecodeError;

/// Minimum length of a weight notification.
pub const PACKET_LEN: usize = 20;
/// Fixed two-byte header of a weight notification.
pub const HEADER: [u8; 2] = [0x03, 0x0B];
/// Sign byte marking a positive value (ASCII `+`).
pub const SIGN_POSITIVE: u8 = 0x2B;
/// Sign byte used for negative values (ASCII `-`).
pub const SIGN_NEGATIVE: u8 = 0x2D;

/// GATT service exposing the scale's characteristics.
pub const SERVICE_ID: u16 = 0x0FFE;
/// Characteristic accepting 6-byte command frames.
pub const COMMAND_CHAR: u16 = 0xFF12;
/// Characteristic emitting weight/flow notifications.
pub const WEIGHT_CHAR: u16 = 0xFF11;

/// One decoded weight notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleReading {
    /// Scale-side timer in milliseconds (24-bit).
    pub timestamp_ms: u32,
    pub weight_g: f32,
    /// Flow as reported by the scale firmware. Not used for decisions.
    pub flow_gps: f32,
    pub battery_pct: u8,
    pub standby_min: u16,
}

#[inline]
fn signed(sign: u8, magnitude: u32) -> f32 {
    let v = magnitude as f32 / 100.0;
    if sign == SIGN_POSITIVE { v } else { -v }
}

/// Decode a weight notification.
///
/// Layout (big-endian):
/// `[0..2)` header, `[2..5)` milliseconds, `[5]` unit, `[6]` weight sign,
/// `[7..10)` weight x100, `[10]` flow sign, `[11..13)` flow x100,
/// `[13]` battery %, `[14..16)` standby minutes.
pub fn decode(bytes: &[u8]) -> Result<ScaleReading, DecodeError> {
    if bytes.len() < PACKET_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    if bytes[0..2] != HEADER {
        return Err(DecodeError::BadHeader {
            b0: bytes[0],
            b1: bytes[1],
        });
    }
    let be24 = |i: usize| {
        (u32::from(bytes[i]) << 16) | (u32::from(bytes[i + 1]) << 8) | u32::from(bytes[i + 2])
    };
    let flow_mag = (u32::from(bytes[11]) << 8) | u32::from(bytes[12]);
    Ok(ScaleReading {
        timestamp_ms: be24(2),
        weight_g: signed(bytes[6], be24(7)),
        flow_gps: signed(bytes[10], flow_mag),
        battery_pct: bytes[13],
        standby_min: u16::from_be_bytes([bytes[14], bytes[15]]),
    })
}

/// Commands accepted on [`COMMAND_CHAR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleCommand {
    Tare,
    StartTimer,
    StopTimer,
    ResetTimer,
    StartAndTare,
    Beep,
}

impl ScaleCommand {
    /// Bit-exact 6-byte frame for this command.
    pub const fn frame(self) -> [u8; 6] {
        match self {
            Self::Tare => [0x03, 0x0A, 0x01, 0x00, 0x00, 0x08],
            Self::StartTimer => [0x03, 0x0A, 0x04, 0x00, 0x00, 0x0A],
            Self::StopTimer => [0x03, 0x0A, 0x05, 0x00, 0x00, 0x0D],
            Self::ResetTimer => [0x03, 0x0A, 0x06, 0x00, 0x00, 0x0C],
            Self::StartAndTare => [0x03, 0x0A, 0x07, 0x00, 0x00, 0x00],
            Self::Beep => [0x03, 0x0A, 0x02, 0x00, 0x03, 0x08],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Tare => "tare",
            Self::StartTimer => "start_timer",
            Self::StopTimer => "stop_timer",
            Self::ResetTimer => "reset_timer",
            Self::StartAndTare => "start_and_tare",
            Self::Beep => "beep",
        }
    }

    /// Commands after which the scale zeroes its weight.
    pub const fn zeroes_weight(self) -> bool {
        matches!(self, Self::Tare | Self::StartAndTare)
    }

    /// Commands after which the scale restarts its timer.
    pub const fn restarts_timer(self) -> bool {
        matches!(self, Self::ResetTimer | Self::StartAndTare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> [u8; PACKET_LEN] {
        let mut p = [0u8; PACKET_LEN];
        p[0] = 0x03;
        p[1] = 0x0B;
        // 0x01_E2_40 = 123_456 ms
        p[2..5].copy_from_slice(&[0x01, 0xE2, 0x40]);
        p[6] = SIGN_POSITIVE;
        // 3_612 -> 36.12 g
        p[7..10].copy_from_slice(&[0x00, 0x0E, 0x1C]);
        p[10] = SIGN_NEGATIVE;
        // 150 -> 1.50 g/s
        p[11..13].copy_from_slice(&[0x00, 0x96]);
        p[13] = 87;
        p[14..16].copy_from_slice(&[0x00, 0x0F]);
        p
    }

    #[test]
    fn decodes_fields() {
        let r = decode(&packet()).unwrap();
        assert_eq!(r.timestamp_ms, 123_456);
        assert!((r.weight_g - 36.12).abs() < 1e-4);
        assert!((r.flow_gps + 1.5).abs() < 1e-4);
        assert_eq!(r.battery_pct, 87);
        assert_eq!(r.standby_min, 15);
    }

    #[test]
    fn any_non_plus_sign_is_negative() {
        let mut p = packet();
        p[6] = 0x00;
        assert!(decode(&p).unwrap().weight_g < 0.0);
    }

    #[test]
    fn longer_packets_are_accepted() {
        let mut v = packet().to_vec();
        v.extend_from_slice(&[0xFF; 4]);
        assert!(decode(&v).is_ok());
    }

    #[test]
    fn short_and_bad_header_are_malformed() {
        let p = packet();
        let e = decode(&p[..19]).unwrap_err();
        assert_eq!(e, DecodeError::TooShort { len: 19 });
        assert!(e.is_malformed());
        let mut q = p;
        q[1] = 0x0A;
        assert_eq!(
            decode(&q).unwrap_err(),
            DecodeError::BadHeader { b0: 0x03, b1: 0x0A }
        );
    }

    #[test]
    fn command_frames_are_bit_exact() {
        assert_eq!(ScaleCommand::Tare.frame(), [0x03, 0x0A, 0x01, 0x00, 0x00, 0x08]);
        assert_eq!(ScaleCommand::Beep.frame(), [0x03, 0x0A, 0x02, 0x00, 0x03, 0x08]);
        assert_eq!(
            ScaleCommand::StartAndTare.frame(),
            [0x03, 0x0A, 0x07, 0x00, 0x00, 0x00]
        );
    }
}
