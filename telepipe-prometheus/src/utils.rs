use std::borrow::Cow;

/// Units whose "per" form drops the numerator, `1/s` becomes `per_second`.
const DIMENSIONLESS_NUMERATORS: [&str; 8] = ["1", "d", "h", "min", "s", "ms", "us", "ns"];

/// Suffix appended to a metric name for its UCUM unit, `None` for empty,
/// unknown or annotation (`{request}`) units.
pub(crate) fn unit_suffix(unit: &str) -> Option<Cow<'static, str>> {
    if unit.is_empty() {
        return None;
    }
    if let Some(name) = unit_name(unit) {
        return Some(Cow::Borrowed(name));
    }

    let (numerator, denominator) = unit.split_once('/')?;
    let per = per_unit_name(denominator)?;
    match unit_name(numerator) {
        Some(name) if !DIMENSIONLESS_NUMERATORS.contains(&numerator) => {
            Some(Cow::Owned(format!("{name}_per_{per}")))
        }
        _ => Some(Cow::Owned(format!("per_{per}"))),
    }
}

fn unit_name(unit: &str) -> Option<&'static str> {
    let name = match unit {
        "d" => "days",
        "h" => "hours",
        "min" => "minutes",
        "s" => "seconds",
        "ms" => "milliseconds",
        "us" => "microseconds",
        "ns" => "nanoseconds",

        "By" | "B" => "bytes",
        "KiBy" => "kibibytes",
        "MiBy" => "mebibytes",
        "GiBy" => "gibibytes",
        "KBy" | "KB" => "kilobytes",
        "MBy" | "MB" => "megabytes",
        "GBy" | "GB" => "gigabytes",

        "m" => "meters",
        "V" => "volts",
        "A" => "amperes",
        "J" => "joules",
        "W" => "watts",
        "g" => "grams",
        "Cel" => "celsius",
        "Hz" => "hertz",
        "1" => "ratio",
        "%" => "percent",
        _ => return None,
    };
    Some(name)
}

fn per_unit_name(unit: &str) -> Option<&'static str> {
    let name = match unit {
        "s" => "second",
        "m" => "minute",
        "h" => "hour",
        "d" => "day",
        "w" => "week",
        "mo" => "month",
        "y" => "year",
        _ => return None,
    };
    Some(name)
}

/// Replaces every character outside `[a-zA-Z0-9_:]` with `_` and prefixes
/// names starting with a digit.
pub(crate) fn sanitize_name(name: &str) -> Cow<'_, str> {
    let valid = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':';
    let starts_with_digit = name.starts_with(|c: char| c.is_ascii_digit());
    if !starts_with_digit && name.chars().all(valid) {
        return Cow::Borrowed(name);
    }

    let prefix = if starts_with_digit { "_" } else { "" };
    Cow::Owned(
        prefix
            .chars()
            .chain(name.chars().map(|c| if valid(c) { c } else { '_' }))
            .collect(),
    )
}

/// Label names allow `[a-zA-Z0-9_]` only.
pub(crate) fn sanitize_label(key: &str) -> String {
    let mut label: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if label.starts_with(|c: char| c.is_ascii_digit()) {
        label.insert(0, '_');
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("traffic_volume", "traffic_volume")]
    #[case("http.server.request.duration", "http_server_request_duration")]
    #[case("nam€_with_3_width_rune", "nam__with_3_width_rune")]
    #[case("1valid_23name", "_1valid_23name")]
    #[case("colon:in:the:middle", "colon:in:the:middle")]
    #[case("a lid/23-name", "a_lid_23_name")]
    #[case("", "")]
    fn names(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(input), expected);
    }

    #[rstest]
    #[case("http.route", "http_route")]
    #[case("service.name", "service_name")]
    #[case("k8s:pod", "k8s_pod")]
    #[case("0day", "_0day")]
    fn labels(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_label(input), expected);
    }

    #[rstest]
    #[case("s", Some("seconds"))]
    #[case("By", Some("bytes"))]
    #[case("1", Some("ratio"))]
    #[case("m/s", Some("meters_per_second"))]
    #[case("1/y", Some("per_year"))]
    #[case("request/s", Some("per_second"))]
    #[case("request", None)]
    #[case("{request}", None)]
    #[case("invalid/invalid", None)]
    #[case("", None)]
    fn unit_suffixes(#[case] unit: &str, #[case] expected: Option<&str>) {
        assert_eq!(unit_suffix(unit).as_deref(), expected);
    }
}
