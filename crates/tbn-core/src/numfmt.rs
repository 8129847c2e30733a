//! Numeric formatting helpers for the text artifacts.

/// Formats a concentration with at most 3 significant digits, preferring
/// plain decimal when the base-10 exponent lies in [-3, 3]. Zero is written
/// as `0.00e0`, the form the equilibrium solvers themselves emit.
pub fn format_concentration(v: f64) -> String {
    if v == 0.0 {
        return "0.00e0".to_string();
    }
    if !v.is_finite() {
        return format!("{v}");
    }
    let exp = v.abs().log10().floor() as i32;
    if (-3..=3).contains(&exp) {
        let scale = 10f64.powi(exp - 2);
        let rounded = (v / scale).round() * scale;
        let decimals = (2 - exp).max(0) as usize;
        format!("{rounded:.decimals$}")
    } else {
        format!("{v:.2e}")
    }
}

/// `%g`-style formatting with the given number of significant digits:
/// plain decimal for moderate exponents, scientific otherwise, trailing
/// zeros trimmed.
pub fn format_sig(v: f64, sig: usize) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return format!("{v}");
    }
    let sig = sig.max(1);
    let exp = v.abs().log10().floor() as i32;
    if exp >= -4 && exp < sig as i32 {
        let decimals = (sig as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}"))
    } else {
        let s = format!("{:.*e}", sig - 1, v);
        match s.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{}", trim_zeros(mantissa), exponent),
            None => s,
        }
    }
}

fn trim_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
