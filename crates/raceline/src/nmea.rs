//! NMEA 0183 sentence decoding.
//!
//! Only the sentence types the tracker can use are supported: GGA (position
//! plus fix quality) and RMC (position plus speed over ground). Anything
//! else is a typed decode failure for the transport to log and drop; a
//! failed decode never reaches the tracker as anything but "no fix event".

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NmeaError {
    #[error("empty input")]
    Empty,

    #[error("not an NMEA sentence")]
    NotNmea,

    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("malformed sentence header")]
    BadHeader,

    #[error("{0} sentence is missing fields")]
    Truncated(&'static str),

    #[error("no usable fix")]
    NoFix,

    #[error("invalid coordinates")]
    BadCoordinates,

    #[error("unsupported sentence type {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    Gga,
    Rmc,
}

/// A successfully decoded position sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFix {
    pub kind: SentenceKind,
    pub lat: f64,
    pub lon: f64,
    pub fix_quality: Option<u8>,
    pub satellites: Option<u32>,
    pub altitude_m: Option<f64>,
    pub speed_knots: Option<f64>,
}

/// Decodes one `$...*hh` sentence.
///
/// The checksum is verified only when a well-formed `*hh` suffix is present,
/// matching receivers that omit it on some sentences.
pub fn parse_sentence(sentence: &str) -> Result<DecodedFix, NmeaError> {
    let trimmed = sentence.trim();
    if trimmed.is_empty() {
        return Err(NmeaError::Empty);
    }
    let Some(body) = trimmed.strip_prefix('$') else {
        return Err(NmeaError::NotNmea);
    };

    let (body, checksum) = match body.split_once('*') {
        Some((data, suffix)) => (data, Some(suffix.trim())),
        None => (body, None),
    };
    if let Some(suffix) = checksum
        && suffix.len() == 2
        && let Ok(expected) = u8::from_str_radix(suffix, 16)
    {
        let computed = body.bytes().fold(0u8, |acc, b| acc ^ b);
        if computed != expected {
            return Err(NmeaError::ChecksumMismatch {
                expected: format!("{expected:02X}"),
                computed: format!("{computed:02X}"),
            });
        }
    }

    let fields: Vec<&str> = body.split(',').collect();
    let header = fields[0];
    if header.len() < 3 {
        return Err(NmeaError::BadHeader);
    }
    let kind = header
        .get(header.len() - 3..)
        .ok_or(NmeaError::BadHeader)?
        .to_ascii_uppercase();

    match kind.as_str() {
        "GGA" => parse_gga(&fields),
        "RMC" => parse_rmc(&fields),
        other => Err(NmeaError::Unsupported(other.to_string())),
    }
}

// $--GGA,hhmmss.sss,ddmm.mmmm,a,dddmm.mmmm,a,x,xx,x.x,x.x,M,x.x,M,x.x,xxxx
fn parse_gga(fields: &[&str]) -> Result<DecodedFix, NmeaError> {
    if fields.len() < 10 {
        return Err(NmeaError::Truncated("GGA"));
    }

    let quality: u8 = fields[6].parse().map_err(|_| NmeaError::NoFix)?;
    if quality == 0 {
        return Err(NmeaError::NoFix);
    }
    let lat = deg_min_to_decimal(fields[2], fields[3], true).ok_or(NmeaError::BadCoordinates)?;
    let lon = deg_min_to_decimal(fields[4], fields[5], false).ok_or(NmeaError::BadCoordinates)?;

    Ok(DecodedFix {
        kind: SentenceKind::Gga,
        lat,
        lon,
        fix_quality: Some(quality),
        satellites: fields[7].parse().ok(),
        altitude_m: fields[9].parse().ok(),
        speed_knots: None,
    })
}

// $--RMC,hhmmss.sss,A,ddmm.mmmm,a,dddmm.mmmm,a,x.x,x.x,ddmmyy,x.x,a
fn parse_rmc(fields: &[&str]) -> Result<DecodedFix, NmeaError> {
    if fields.len() < 10 {
        return Err(NmeaError::Truncated("RMC"));
    }

    if fields[2] != "A" {
        return Err(NmeaError::NoFix);
    }
    let lat = deg_min_to_decimal(fields[3], fields[4], true).ok_or(NmeaError::BadCoordinates)?;
    let lon = deg_min_to_decimal(fields[5], fields[6], false).ok_or(NmeaError::BadCoordinates)?;

    Ok(DecodedFix {
        kind: SentenceKind::Rmc,
        lat,
        lon,
        fix_quality: None,
        satellites: None,
        altitude_m: None,
        speed_knots: fields[7].parse().ok(),
    })
}

/// Converts `ddmm.mmmm` / `dddmm.mmmm` plus a hemisphere letter to decimal
/// degrees. Latitude carries two degree digits, longitude three.
fn deg_min_to_decimal(raw: &str, hemisphere: &str, is_lat: bool) -> Option<f64> {
    let degree_digits = if is_lat { 2 } else { 3 };
    if raw.len() < degree_digits || hemisphere.is_empty() {
        return None;
    }

    let degrees: f64 = raw.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = raw.get(degree_digits..)?.parse().ok()?;
    let mut value = degrees + minutes / 60.0;
    if matches!(hemisphere, "S" | "W") {
        value = -value;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn decodes_gga() {
        let fix = parse_sentence(GGA).unwrap();
        assert_eq!(fix.kind, SentenceKind::Gga);
        assert!((fix.lat - 48.1173).abs() < 1e-4);
        assert!((fix.lon - 11.516_667).abs() < 1e-4);
        assert_eq!(fix.fix_quality, Some(1));
        assert_eq!(fix.satellites, Some(8));
        assert_eq!(fix.altitude_m, Some(545.4));
    }

    #[test]
    fn decodes_rmc() {
        let fix = parse_sentence(RMC).unwrap();
        assert_eq!(fix.kind, SentenceKind::Rmc);
        assert!((fix.lat - 48.1173).abs() < 1e-4);
        assert!((fix.lon - 11.516_667).abs() < 1e-4);
        assert_eq!(fix.speed_knots, Some(22.4));
        assert_eq!(fix.fix_quality, None);
    }

    #[test]
    fn southern_and_western_hemispheres_negate() {
        let sentence = "$GPGGA,123519,4807.038,S,01131.000,W,1,08,0.9,545.4,M,46.9,M,,";
        let fix = parse_sentence(sentence).unwrap();
        assert!(fix.lat < 0.0);
        assert!(fix.lon < 0.0);
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let corrupted = GGA.replace("*47", "*48");
        assert!(matches!(
            parse_sentence(&corrupted),
            Err(NmeaError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn skips_verification_without_well_formed_checksum() {
        let no_checksum = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        assert!(parse_sentence(no_checksum).is_ok());
    }

    #[test]
    fn rejects_gga_without_fix() {
        let no_fix = "$GPGGA,123519,4807.038,N,01131.000,E,0,00,,,M,,M,,";
        assert_eq!(parse_sentence(no_fix), Err(NmeaError::NoFix));
    }

    #[test]
    fn rejects_void_rmc() {
        let void = "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
        assert_eq!(parse_sentence(void), Err(NmeaError::NoFix));
    }

    #[test]
    fn rejects_unsupported_sentences() {
        let gll = "$GPGLL,4916.45,N,12311.12,W,225444,A";
        assert_eq!(
            parse_sentence(gll),
            Err(NmeaError::Unsupported("GLL".to_string()))
        );
    }

    #[test]
    fn rejects_non_nmea_input() {
        assert_eq!(parse_sentence(""), Err(NmeaError::Empty));
        assert_eq!(parse_sentence("   "), Err(NmeaError::Empty));
        assert_eq!(parse_sentence("hello"), Err(NmeaError::NotNmea));
        assert_eq!(parse_sentence("$x,1,2"), Err(NmeaError::BadHeader));
    }

    #[test]
    fn rejects_truncated_sentences() {
        assert_eq!(
            parse_sentence("$GPGGA,123519,4807.038"),
            Err(NmeaError::Truncated("GGA"))
        );
    }
}
