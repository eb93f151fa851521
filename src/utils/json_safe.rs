use serde::Serialize;
use serde_json::{Map, Value};

/// 嵌套深度上限，超过后替换为截断标记
pub const MAX_DEPTH: usize = 32;
pub const TRUNCATED: &str = "<truncated>";

/// 尽力把任意可序列化对象转换为可落库的 JSON。
/// 序列化失败时返回 Null 并记录警告，不向上抛错。
pub fn to_jsonable<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => sanitize(v),
        Err(e) => {
            log::warn!("JSON 序列化失败，已置空: {}", e);
            Value::Null
        }
    }
}

/// 对已有 JSON 做收敛：非有限浮点变 null，过深节点截断
pub fn sanitize(value: Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return match value {
            Value::Array(_) | Value::Object(_) => Value::String(TRUNCATED.to_string()),
            other => other,
        };
    }
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| sanitize_at(v, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, sanitize_at(v, depth + 1));
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// 按字符截断（不切断多字节字符）
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nan_becomes_null() {
        #[derive(Serialize)]
        struct Row {
            a: f64,
            b: Option<f64>,
        }
        let v = to_jsonable(&Row { a: f64::NAN, b: Some(1.5) });
        assert_eq!(v, json!({"a": null, "b": 1.5}));
    }

    #[test]
    fn test_deep_nesting_is_truncated() {
        let mut v = json!("leaf");
        for _ in 0..(MAX_DEPTH + 5) {
            v = json!([v]);
        }
        let out = sanitize(v);
        let mut cur = &out;
        let mut depth = 0;
        while let Value::Array(items) = cur {
            cur = &items[0];
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert_eq!(cur, &json!(TRUNCATED));
    }

    #[test]
    fn test_truncate_chars_keeps_cjk_boundary() {
        assert_eq!(truncate_chars("贵州茅台公告", 4), "贵州茅台");
    }
}
