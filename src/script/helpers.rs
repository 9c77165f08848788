//! Helper globals available to every plugin.
//!
//! - `vector(x, y)` builds an `{x, y}` table
//! - `range(from, to [, step])` builds an inclusive list
//! - `color.parse(text)` reads `rrggbb`/`rrggbbaa` hex or a color name
//! - `log.info/warn/error(text)` forward to the host log

use mlua::{Lua, Result as LuaResult, Table, Value};
use tracing::{error, info, warn};

use crate::logging::PLUGIN_TARGET;

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("white", [255, 255, 255]),
    ("black", [0, 0, 0]),
    ("red", [255, 0, 0]),
    ("green", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("orange", [255, 165, 0]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("lightblue", [173, 216, 230]),
    ("transparent", [0, 0, 0]),
];

/// Parse a color into normalized `[r, g, b, a]`.
pub fn parse_color(text: &str) -> Option<[f64; 4]> {
    let text = text.trim();
    let lowered = text.to_ascii_lowercase();
    if let Some((_, rgb)) = NAMED_COLORS.iter().find(|(name, _)| *name == lowered) {
        let alpha = if lowered == "transparent" { 0.0 } else { 1.0 };
        return Some([
            f64::from(rgb[0]) / 255.0,
            f64::from(rgb[1]) / 255.0,
            f64::from(rgb[2]) / 255.0,
            alpha,
        ]);
    }

    let hex = text.strip_prefix('#').unwrap_or(text);
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| -> Option<f64> {
        u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .ok()
            .map(|v| f64::from(v) / 255.0)
    };
    let alpha = if hex.len() == 8 { channel(3)? } else { 1.0 };
    Some([channel(0)?, channel(1)?, channel(2)?, alpha])
}

/// Most values a single `range` call may produce.
pub const MAX_RANGE_LEN: usize = 1 << 20;

/// Inclusive numeric range. An empty list when `step` points away from `to`.
///
/// The length is computed before anything is allocated; ranges longer than
/// [`MAX_RANGE_LEN`] are refused.
pub fn range(from: i64, to: i64, step: i64) -> LuaResult<Vec<i64>> {
    if step == 0 || (step > 0 && from > to) || (step < 0 && from < to) {
        return Ok(Vec::new());
    }
    let span = (i128::from(to) - i128::from(from)).unsigned_abs();
    let count = span / u128::from(step.unsigned_abs()) + 1;
    let count = usize::try_from(count)
        .ok()
        .filter(|count| *count <= MAX_RANGE_LEN)
        .ok_or_else(|| {
            mlua::Error::RuntimeError(format!(
                "range({from}, {to}, {step}) holds {count} values, more than {MAX_RANGE_LEN}"
            ))
        })?;

    let mut out = Vec::with_capacity(count);
    let mut current = from;
    for _ in 0..count {
        out.push(current);
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(out)
}

/// Registers the helper globals.
pub struct HelperApi;

impl HelperApi {
    pub fn register(lua: &Lua) -> LuaResult<()> {
        let globals = lua.globals();
        Self::register_geometry(lua, &globals)?;
        Self::register_color(lua, &globals)?;
        Self::register_log(lua, &globals)?;
        Ok(())
    }

    fn register_geometry(lua: &Lua, globals: &Table) -> LuaResult<()> {
        let vector_fn = lua.create_function(|lua, (x, y): (Option<f64>, Option<f64>)| {
            let v = lua.create_table()?;
            v.set("x", x.unwrap_or(0.0))?;
            v.set("y", y.unwrap_or(0.0))?;
            Ok(v)
        })?;
        globals.set("vector", vector_fn)?;

        let range_fn = lua.create_function(|lua, (from, to, step): (i64, i64, Option<i64>)| {
            lua.create_sequence_from(range(from, to, step.unwrap_or(1))?)
        })?;
        globals.set("range", range_fn)?;
        Ok(())
    }

    fn register_color(lua: &Lua, globals: &Table) -> LuaResult<()> {
        let color = lua.create_table()?;
        let parse_fn = lua.create_function(|lua, text: String| {
            let Some([r, g, b, a]) = parse_color(&text) else {
                return Ok(Value::Nil);
            };
            let c = lua.create_table()?;
            c.set("r", r)?;
            c.set("g", g)?;
            c.set("b", b)?;
            c.set("a", a)?;
            Ok(Value::Table(c))
        })?;
        color.set("parse", parse_fn)?;
        globals.set("color", color)?;
        Ok(())
    }

    fn register_log(lua: &Lua, globals: &Table) -> LuaResult<()> {
        let log = lua.create_table()?;
        log.set(
            "info",
            lua.create_function(|_, text: String| {
                info!(target: PLUGIN_TARGET, "{}", text);
                Ok(())
            })?,
        )?;
        log.set(
            "warn",
            lua.create_function(|_, text: String| {
                warn!(target: PLUGIN_TARGET, "{}", text);
                Ok(())
            })?,
        )?;
        log.set(
            "error",
            lua.create_function(|_, text: String| {
                error!(target: PLUGIN_TARGET, "{}", text);
                Ok(())
            })?,
        )?;
        globals.set("log", log)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_color("ffffff"), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(parse_color("#000000"), Some([0.0, 0.0, 0.0, 1.0]));
        let [r, _, _, a] = parse_color("ff000080").unwrap();
        assert_eq!(r, 1.0);
        assert!((a - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_named_and_invalid() {
        assert_eq!(parse_color("White"), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(parse_color("transparent").unwrap()[3], 0.0);
        assert!(parse_color("fff").is_none());
        assert!(parse_color("zzzzzz").is_none());
        assert!(parse_color("ééé").is_none());
    }

    #[test]
    fn test_range() {
        assert_eq!(range(1, 4, 1).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(range(4, 1, -2).unwrap(), vec![4, 2]);
        assert!(range(1, 4, -1).unwrap().is_empty());
        assert!(range(1, 4, 0).unwrap().is_empty());
    }

    #[test]
    fn test_range_at_integer_limits() {
        assert_eq!(range(i64::MAX - 1, i64::MAX, 1).unwrap(), vec![i64::MAX - 1, i64::MAX]);
        assert_eq!(range(i64::MIN + 1, i64::MIN, -1).unwrap(), vec![i64::MIN + 1, i64::MIN]);
        assert_eq!(range(i64::MAX - 2, i64::MAX, 5).unwrap(), vec![i64::MAX - 2]);
        assert!(range(i64::MIN, i64::MAX, 1).is_err());
    }

    #[test]
    fn test_range_length_is_capped() {
        assert_eq!(range(1, MAX_RANGE_LEN as i64, 1).unwrap().len(), MAX_RANGE_LEN);
        assert!(range(1, MAX_RANGE_LEN as i64 + 1, 1).is_err());
        assert!(range(1, 1_000_000_000_000, 1).is_err());

        let lua = Lua::new();
        HelperApi::register(&lua).unwrap();
        let err = lua.load("return #range(1, 1e12)").eval::<i64>().unwrap_err();
        assert!(err.to_string().contains("more than"));
        let len: i64 = lua
            .load("return #range(math.maxinteger - 1, math.maxinteger)")
            .eval()
            .unwrap();
        assert_eq!(len, 2);
    }

    #[test]
    fn test_registered_globals() {
        let lua = Lua::new();
        HelperApi::register(&lua).unwrap();

        let sum: f64 = lua
            .load("local v = vector(3, 4) return v.x + v.y + #range(1, 5)")
            .eval()
            .unwrap();
        assert_eq!(sum, 12.0);

        let red: f64 = lua.load("return color.parse('#ff0000').r").eval().unwrap();
        assert_eq!(red, 1.0);
        let missing: Value = lua.load("return color.parse('nope')").eval().unwrap();
        assert!(missing.is_nil());

        lua.load("log.info('hello from plugin')").exec().unwrap();
    }
}
