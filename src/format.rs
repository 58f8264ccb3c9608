/// Pretty-print a base-pair magnitude with a human-scaled unit suffix.
pub fn format_bp(bp: f64) -> String {
    if bp < 500.0 {
        format!("{:.0} bp ", bp)
    } else if bp <= 500_000.0 {
        format!("{:.1} kbp", bp / 1e3)
    } else if bp < 500_000_000.0 {
        format!("{:.1} Mbp", bp / 1e6)
    } else if bp < 500_000_000_000.0 {
        format!("{:.1} Gbp", bp / 1e9)
    } else {
        "???".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_match_reference_scenario_s5() {
        assert_eq!(format_bp(499.0), "499 bp ");
        assert_eq!(format_bp(500.0), "0.5 kbp");
        assert_eq!(format_bp(500_000.0), "500.0 kbp");
        assert_eq!(format_bp(500_001.0), "0.5 Mbp");
        assert_eq!(format_bp(499e9), "499.0 Gbp");
        assert_eq!(format_bp(500e9), "???");
    }

    #[test]
    fn zero_is_bp() {
        assert_eq!(format_bp(0.0), "0 bp ");
    }
}
