/// Group the integer digits of `value` with `.` separators.
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// Format an amount in Colombian pesos, e.g. `$ 2.550.000`
pub fn format_cop(amount: f64) -> String {
    if !amount.is_finite() {
        return "$ -".to_string();
    }
    let rounded = amount.abs().round() as u64;
    let sign = if amount < 0.0 && rounded > 0 { "-" } else { "" };
    format!("{}$ {}", sign, group_thousands(rounded))
}

/// Format an energy amount, switching to MWh above 10 000 kWh
pub fn format_kwh(kwh: f64) -> String {
    if !kwh.is_finite() {
        return "- kWh".to_string();
    }
    if kwh.abs() >= 10_000.0 {
        format!("{:.1} MWh", kwh / 1000.0)
    } else {
        let rounded = kwh.abs().round() as u64;
        let sign = if kwh < 0.0 && rounded > 0 { "-" } else { "" };
        format!("{}{} kWh", sign, group_thousands(rounded))
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.0}%", value)
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
