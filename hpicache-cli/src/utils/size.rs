use crate::error::AppError;

/// Parse the `--max-size` value. Bare numbers mean GB (the common case for a
/// plugin store bound); an explicit unit suffix (B, KB, MB, GB, TB) is also
/// accepted.
pub fn parse_max_size(size_str: &str) -> Result<u64, AppError> {
    let size_str = size_str.trim().to_lowercase();

    if size_str.is_empty() {
        return Err(AppError::Parse("invalid size: empty string".to_string()));
    }

    let mut numeric_part = String::new();
    let mut unit_part = String::new();

    for c in size_str.chars() {
        if c.is_ascii_digit() || c == '.' {
            numeric_part.push(c);
        } else {
            unit_part.push(c);
        }
    }

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::Parse(format!("invalid size number: {size_str:?}")))?;

    const KB: f64 = 1024.0;
    let bytes = match unit_part.trim() {
        // No unit: the bound is given in GB.
        "" | "gb" => value * KB * KB * KB,
        "b" => value,
        "kb" => value * KB,
        "mb" => value * KB * KB,
        "tb" => value * KB * KB * KB * KB,
        other => return Err(AppError::Parse(format!("invalid size unit: {other:?}"))),
    };

    Ok(bytes as u64)
}

/// Convert bytes to a human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
