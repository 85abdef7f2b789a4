//! Float rendering that matches what the portal's clients have always parsed:
//! integral values keep a trailing `.0`, and very small or very large
//! magnitudes switch to a two-digit-exponent scientific form (`1.0e-05`).

const SCIENTIFIC_LOWER: f64 = 1e-4;
const SCIENTIFIC_UPPER: f64 = 1e16;

#[must_use]
pub fn display_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }

    if value.is_infinite() {
        return if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }

    if value == 0.0 {
        return if value.is_sign_negative() {
            "-0.0".to_string()
        } else {
            "0.0".to_string()
        };
    }

    let magnitude = value.abs();
    if magnitude < SCIENTIFIC_LOWER || magnitude >= SCIENTIFIC_UPPER {
        return scientific(value);
    }

    let rendered = value.to_string();
    if rendered.contains('.') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

fn scientific(value: f64) -> String {
    let rendered = format!("{value:e}");
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((&rendered, "0"));

    let mantissa = if mantissa.contains('.') {
        mantissa.to_string()
    } else {
        format!("{mantissa}.0")
    };

    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };

    format!("{mantissa}e{sign}{digits:0>2}")
}

/// Rounds half away from zero to four decimal places.
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0.0, "0.0")]
    #[case(3.0, "3.0")]
    #[case(-2.0, "-2.0")]
    #[case(1.5, "1.5")]
    #[case(0.1 + 0.2, "0.30000000000000004")]
    #[case(1234567.0, "1234567.0")]
    #[case(0.00001, "1.0e-05")]
    #[case(0.000_012_5, "1.25e-05")]
    #[case(1e16, "1.0e+16")]
    #[case(0.0001, "0.0001")]
    fn renders_like_the_clients_expect(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(display_float(value), expected);
    }

    #[test]
    fn rounds_to_four_places() {
        assert_eq!(round4(1.234_56), 1.2346);
        assert_eq!(round4(-0.000_04), -0.0);
        assert_eq!(round4(2.0), 2.0);
    }
}
