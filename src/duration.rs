//! Rounding and rendering of elapsed times for human-readable log output.

use std::time::Duration;

/// Number of significant decimal digits kept by [`round_duration`].
const SIGNIFICANT_DIGITS: u32 = 4;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Rounds `d` to at most four significant digits of its nanosecond count.
///
/// Ties round half-up at the fifth digit, so `1.2345ms` becomes `1.235ms` and
/// `123ns` is returned unchanged.
///
/// ```rust
/// use loghttp::duration::round_duration;
/// use std::time::Duration;
///
/// assert_eq!(round_duration(Duration::from_nanos(1_234_567)), Duration::from_nanos(1_235_000));
/// assert_eq!(round_duration(Duration::from_nanos(123)), Duration::from_nanos(123));
/// ```
pub fn round_duration(d: Duration) -> Duration {
    let nanos = d.as_nanos();
    let digits = decimal_digits(nanos);
    if digits <= SIGNIFICANT_DIGITS {
        return d;
    }

    let unit = 10u128.pow(digits - SIGNIFICANT_DIGITS);
    let rounded = (nanos + unit / 2) / unit * unit;
    // Rounding up past Duration::MAX is not representable; keep the truncated value.
    from_nanos(rounded).unwrap_or_else(|| from_nanos(nanos / unit * unit).unwrap_or(Duration::MAX))
}

/// Renders `d` with the largest fitting unit: `123ns`, `12.35µs`, `1.235ms`,
/// `2.5s`. From one minute on, hours and minutes are spelled out as in
/// `39m6s` or `1h0m0s`. A zero duration is `0s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", with_fraction(nanos / 1_000, nanos % 1_000, 3));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", with_fraction(nanos / 1_000_000, nanos % 1_000_000, 6));
    }

    let secs = d.as_secs();
    let seconds = with_fraction(u128::from(secs % 60), u128::from(d.subsec_nanos()), 9);
    let minutes = secs / 60;
    match minutes / 60 {
        _ if minutes == 0 => format!("{seconds}s"),
        0 => format!("{minutes}m{seconds}s"),
        hours => format!("{hours}h{}m{seconds}s", minutes % 60),
    }
}

/// `int.frac` with `frac` zero-padded to `digits` and trailing zeros dropped.
fn with_fraction(int: u128, frac: u128, digits: usize) -> String {
    if frac == 0 {
        return int.to_string();
    }
    let frac = format!("{frac:0digits$}");
    format!("{int}.{}", frac.trim_end_matches('0'))
}

fn decimal_digits(n: u128) -> u32 {
    n.checked_ilog10().map_or(1, |l| l + 1)
}

fn from_nanos(nanos: u128) -> Option<Duration> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    // Remainder is always below one second.
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Some(Duration::new(secs, subsec))
}
