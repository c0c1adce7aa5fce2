//! Custom template filters
//!
//! Registered on top of tera's builtins. The `date` filter replaces the
//! builtin so the token format (`YYYY MM DD HH mm ss`) and the `"now"`
//! value resolve through the context clock.

use chrono::{DateTime, TimeZone, Utc};
use khor_config::Clock;
use std::collections::HashMap;
use tera::{Result as TeraResult, Tera, Value};

/// Register every custom filter on a tera instance
pub fn register_all(tera: &mut Tera, clock: Clock) {
    tera.register_filter("date", make_date_filter(clock));
    tera.register_filter("tojson", tojson);
    tera.register_filter("dump", dump);
    tera.register_filter("sum", sum);
    tera.register_filter("min", min);
    tera.register_filter("max", max);
    tera.register_filter("bool", to_bool);
    tera.register_filter("string", to_string);
    tera.register_filter("int", to_int);
    tera.register_filter("number_format", number_format);
    tera.register_filter("pascalCase", pascal_case);
    tera.register_filter("camelCase", camel_case);
    tera.register_filter("kebabCase", kebab_case);
    tera.register_filter("titleCase", title_case);
    tera.register_filter("groupby", groupby);
}

/// Translate the token format into a chrono format string
fn translate_format(tokens: &str) -> String {
    let mut out = String::with_capacity(tokens.len());
    let chars: Vec<char> = tokens.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let rest: String = chars[i..].iter().collect();
        if rest.starts_with("YYYY") {
            out.push_str("%Y");
            i += 4;
        } else if rest.starts_with("MM") {
            out.push_str("%m");
            i += 2;
        } else if rest.starts_with("DD") {
            out.push_str("%d");
            i += 2;
        } else if rest.starts_with("HH") {
            out.push_str("%H");
            i += 2;
        } else if rest.starts_with("mm") {
            out.push_str("%M");
            i += 2;
        } else if rest.starts_with("ss") {
            out.push_str("%S");
            i += 2;
        } else {
            if chars[i] == '%' {
                out.push('%');
            }
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn make_date_filter(
    clock: Clock,
) -> impl Fn(&Value, &HashMap<String, Value>) -> TeraResult<Value> + Send + Sync {
    move |value: &Value, args: &HashMap<String, Value>| {
        let format = args
            .get("fmt")
            .or_else(|| args.get("format"))
            .and_then(Value::as_str)
            .unwrap_or("YYYY-MM-DD");
        let instant: DateTime<Utc> = match value {
            Value::String(s) if s == "now" => clock.now(),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| tera::Error::msg(format!("date filter: {}", e)))?,
            Value::Number(n) => {
                let secs = n
                    .as_i64()
                    .ok_or_else(|| tera::Error::msg("date filter requires integer seconds"))?;
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| tera::Error::msg("date filter: timestamp out of range"))?
            }
            other => {
                return Err(tera::Error::msg(format!(
                    "date filter cannot format {}",
                    other
                )))
            }
        };
        Ok(Value::String(
            instant.format(&translate_format(format)).to_string(),
        ))
    }
}

fn tojson(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    Ok(Value::String(
        serde_json::to_string(value).map_err(|e| tera::Error::msg(e.to_string()))?,
    ))
}

fn dump(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    Ok(Value::String(
        serde_json::to_string_pretty(value).map_err(|e| tera::Error::msg(e.to_string()))?,
    ))
}

fn numbers_of(value: &Value, filter: &str) -> TeraResult<Vec<f64>> {
    let items = value
        .as_array()
        .ok_or_else(|| tera::Error::msg(format!("{} filter requires an array", filter)))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| tera::Error::msg(format!("{} filter requires numbers", filter)))
        })
        .collect()
}

fn json_number(value: f64) -> TeraResult<Value> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(Value::from(value as i64));
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| tera::Error::msg("non-finite number"))
}

fn sum(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    json_number(numbers_of(value, "sum")?.iter().sum())
}

fn min(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let numbers = numbers_of(value, "min")?;
    let smallest = numbers
        .into_iter()
        .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.min(n))))
        .ok_or_else(|| tera::Error::msg("min filter on empty array"))?;
    json_number(smallest)
}

fn max(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let numbers = numbers_of(value, "max")?;
    let largest = numbers
        .into_iter()
        .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.max(n))))
        .ok_or_else(|| tera::Error::msg("max filter on empty array"))?;
    json_number(largest)
}

fn to_bool(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let truthy = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    };
    Ok(Value::Bool(truthy))
}

fn to_string(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let out = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(Value::String(out))
}

fn to_int(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let out = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| tera::Error::msg("int filter: number out of range"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f as i64)
            .map_err(|e| tera::Error::msg(format!("int filter: {}", e)))?,
        Value::Bool(b) => *b as i64,
        other => return Err(tera::Error::msg(format!("int filter cannot convert {}", other))),
    };
    Ok(Value::from(out))
}

fn number_format(value: &Value, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let separator = args
        .get("separator")
        .and_then(Value::as_str)
        .unwrap_or(",");
    let n = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| tera::Error::msg("number_format requires a number"))?;
    let digits = n.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(c);
    }
    let sign = if n < 0 { "-" } else { "" };
    Ok(Value::String(format!("{}{}", sign, grouped)))
}

/// Split an identifier into words at `_`, `-`, whitespace and case changes
fn split_words(input: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in input.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
        } else {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn input_string(value: &Value, filter: &str) -> TeraResult<String> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| tera::Error::msg(format!("{} filter requires a string", filter)))
}

fn pascal_case(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let words = split_words(&input_string(value, "pascalCase")?);
    Ok(Value::String(words.iter().map(|w| capitalize(w)).collect()))
}

fn camel_case(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let words = split_words(&input_string(value, "camelCase")?);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_lowercase());
        } else {
            out.push_str(&capitalize(word));
        }
    }
    Ok(Value::String(out))
}

fn kebab_case(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let words = split_words(&input_string(value, "kebabCase")?);
    Ok(Value::String(
        words
            .iter()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join("-"),
    ))
}

fn title_case(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    let words = split_words(&input_string(value, "titleCase")?);
    Ok(Value::String(
        words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(" "),
    ))
}

fn groupby(value: &Value, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let key = args
        .get("attribute")
        .or_else(|| args.get("key"))
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("groupby filter requires an `attribute` argument"))?;
    let items = value
        .as_array()
        .ok_or_else(|| tera::Error::msg("groupby filter requires an array"))?;
    let mut groups = serde_json::Map::new();
    for item in items {
        let bucket = item
            .get(key)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        if let Some(bucket) = groups
            .entry(bucket)
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
        {
            bucket.push(item.clone());
        }
    }
    Ok(Value::Object(groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tera::Context;

    fn engine() -> Tera {
        let mut tera = Tera::default();
        let fixed = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 6).unwrap();
        register_all(&mut tera, Clock::Fixed(fixed));
        tera
    }

    fn render(template: &str, ctx: &Context) -> String {
        engine().render_str(template, ctx).unwrap()
    }

    #[test]
    fn date_now_uses_clock_tokens() {
        let out = render("{{ \"now\" | date(fmt=\"YYYY-MM-DD HH:mm:ss\") }}", &Context::new());
        assert_eq!(out, "2024-03-09 14:05:06");
    }

    #[test]
    fn date_formats_rfc3339_strings() {
        let out = render("{{ \"2023-07-01T10:20:30Z\" | date(fmt=\"DD/MM/YYYY\") }}", &Context::new());
        assert_eq!(out, "01/07/2023");
    }

    #[test]
    fn case_filters() {
        let mut ctx = Context::new();
        ctx.insert("name", "user account_id");
        assert_eq!(render("{{ name | pascalCase }}", &ctx), "UserAccountId");
        assert_eq!(render("{{ name | camelCase }}", &ctx), "userAccountId");
        assert_eq!(render("{{ name | kebabCase }}", &ctx), "user-account-id");
        assert_eq!(render("{{ name | titleCase }}", &ctx), "User Account Id");
    }

    #[test]
    fn case_split_handles_camel_input() {
        let mut ctx = Context::new();
        ctx.insert("name", "parseHookGraph");
        assert_eq!(render("{{ name | kebabCase }}", &ctx), "parse-hook-graph");
    }

    #[test]
    fn aggregate_filters() {
        let mut ctx = Context::new();
        ctx.insert("xs", &vec![3, 1, 2]);
        assert_eq!(render("{{ xs | sum }}", &ctx), "6");
        assert_eq!(render("{{ xs | min }}", &ctx), "1");
        assert_eq!(render("{{ xs | max }}", &ctx), "3");
    }

    #[test]
    fn tojson_and_dump() {
        let mut ctx = Context::new();
        ctx.insert("v", &serde_json::json!({"a": 1}));
        assert_eq!(render("{{ v | tojson }}", &ctx), "{\"a\":1}");
        assert!(render("{{ v | dump }}", &ctx).contains("\"a\": 1"));
    }

    #[test]
    fn bool_and_int_coercion() {
        let ctx = Context::new();
        assert_eq!(render("{{ \"yes\" | bool }}", &ctx), "true");
        assert_eq!(render("{{ 0 | bool }}", &ctx), "false");
        assert_eq!(render("{{ \"42.9\" | int }}", &ctx), "42");
        assert_eq!(render("{{ true | int }}", &ctx), "1");
    }

    #[test]
    fn number_format_groups_thousands() {
        let ctx = Context::new();
        assert_eq!(render("{{ 1234567 | number_format }}", &ctx), "1,234,567");
        assert_eq!(render("{{ -1000 | number_format }}", &ctx), "-1,000");
        assert_eq!(render("{{ 999 | number_format }}", &ctx), "999");
    }

    #[test]
    fn groupby_buckets_by_attribute() {
        let mut ctx = Context::new();
        ctx.insert(
            "rows",
            &serde_json::json!([
                {"kind": "a", "n": 1},
                {"kind": "b", "n": 2},
                {"kind": "a", "n": 3},
            ]),
        );
        let out = render("{{ rows | groupby(attribute=\"kind\") | tojson }}", &ctx);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["a"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["b"].as_array().unwrap().len(), 1);
    }
}
