//! Human-readable number formatting for reports.

/// Abbreviate large magnitudes with K/M/B suffixes.
///
/// Whole multiples print without a fraction (`2M`); everything else keeps
/// one decimal (`1.5K`). Values under a thousand print as integers.
pub fn human(n: f64) -> String {
    let a = n.abs();
    let (value, suffix) = if a >= 1e9 {
        (n / 1e9, "B")
    } else if a >= 1e6 {
        (n / 1e6, "M")
    } else if a >= 1e3 {
        (n / 1e3, "K")
    } else {
        return format!("{}", n.trunc() as i64);
    };
    if value.fract() == 0.0 {
        format!("{}{suffix}", value as i64)
    } else {
        format!("{value:.1}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human() {
        assert_eq!(human(999.9), "999");
        assert_eq!(human(1000.0), "1K");
        assert_eq!(human(1500.0), "1.5K");
        assert_eq!(human(6_000_000.0), "6M");
        assert_eq!(human(2.5e9), "2.5B");
        assert_eq!(human(-3000.0), "-3K");
    }
}
