/// 状态路径解析
///
/// 点分隔路径按段从左到右访问状态树：对象按键访问，数组按索引访问。
/// 写入时缺失或非容器的中间值被替换为空对象，已有数组永远不会被替换。

use serde_json::{Map, Value};

use crate::error::{StateError, StateResult};

/// 通配符路径：订阅所有变更
pub const WILDCARD: &str = "*";

/// 拆分路径，空路径表示根
pub fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// 严格祖先路径，从最近的开始，根路径在最后："a.b.c" -> ["a.b", "a", ""]
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    if path.is_empty() {
        return result;
    }
    let mut end = path.len();
    while let Some(index) = path[..end].rfind('.') {
        result.push(&path[..index]);
        end = index;
    }
    result.push("");
    result
}

/// 只读解析
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in segments(path) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn parse_index(path: &str, segment: &str, len: usize) -> StateResult<usize> {
    let index = segment.parse::<usize>().map_err(|_| StateError::InvalidIndex {
        path: path.to_string(),
        segment: segment.to_string(),
    })?;
    if index >= len {
        return Err(StateError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        });
    }
    Ok(index)
}

/// 写入前校验：数组段必须是范围内的索引
///
/// 校验通过后 `write` 不会失败，失败的写入不会留下半创建的中间对象
pub fn check_writable(root: &Value, path: &str) -> StateResult<()> {
    let parts = segments(path);
    if parts.is_empty() {
        return Err(StateError::EmptyPath);
    }

    let mut current = Some(root);
    for part in parts {
        current = match current {
            Some(Value::Array(items)) => {
                let index = parse_index(path, part, items.len())?;
                items.get(index)
            }
            Some(Value::Object(map)) => map.get(part),
            // 缺失或标量：后续段都会新建为对象
            _ => None,
        };
    }
    Ok(())
}

/// 写入值，返回旧值
pub fn write(root: &mut Value, path: &str, value: Value) -> StateResult<Option<Value>> {
    check_writable(root, path)?;

    let parts = segments(path);
    let (last, parents) = match parts.split_last() {
        Some(split) => split,
        None => return Err(StateError::EmptyPath),
    };

    if !root.is_object() && !root.is_array() {
        *root = Value::Object(Map::new());
    }

    let mut current = root;
    for part in parents {
        let child = match current {
            Value::Array(items) => {
                let index = parse_index(path, part, items.len())?;
                &mut items[index]
            }
            Value::Object(map) => map.entry(part.to_string()).or_insert(Value::Null),
            _ => return Err(StateError::NotAContainer { path: path.to_string() }),
        };
        if !child.is_object() && !child.is_array() {
            *child = Value::Object(Map::new());
        }
        current = child;
    }

    match current {
        Value::Object(map) => Ok(map.insert(last.to_string(), value)),
        Value::Array(items) => {
            let index = parse_index(path, last, items.len())?;
            Ok(Some(std::mem::replace(&mut items[index], value)))
        }
        _ => Err(StateError::NotAContainer { path: path.to_string() }),
    }
}
