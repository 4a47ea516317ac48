//! Builtin methods
//!
//! The leaf procedures exposed by a default server. Names and parameter
//! names are part of the wire contract.
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `add` | `a`, `b` numbers | `a + b` |
//! | `subtract` | `a`, `b` numbers | `a - b` |
//! | `multiply` | `a`, `b` numbers | `a * b` |
//! | `divide` | `a`, `b` numbers, `b != 0` | `a / b` |
//! | `get_time` | none | Unix time in seconds |
//! | `reverse_string` | `s` string | `s` reversed |
//! | `echo` | anything | the params mapping |

use std::time::SystemTime;

use dgramrpc_common::{Params, Value};
use serde_json::Number;

use crate::registry::{MethodError, MethodRegistry};

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn register_builtins(registry: &mut MethodRegistry) {
    registry
        .register("add", add)
        .register("subtract", subtract)
        .register("multiply", multiply)
        .register("divide", divide)
        .register("get_time", get_time)
        .register("reverse_string", reverse_string)
        .register("echo", echo);
}

pub fn add(params: &Params) -> Result<Value, MethodError> {
    let (a, b) = operands(params)?;
    number(a + b)
}

pub fn subtract(params: &Params) -> Result<Value, MethodError> {
    let (a, b) = operands(params)?;
    number(a - b)
}

pub fn multiply(params: &Params) -> Result<Value, MethodError> {
    let (a, b) = operands(params)?;
    number(a * b)
}

pub fn divide(params: &Params) -> Result<Value, MethodError> {
    let (a, b) = operands(params)?;
    if b == 0.0 {
        return Err(MethodError::DivisionByZero);
    }
    number(a / b)
}

pub fn get_time(_params: &Params) -> Result<Value, MethodError> {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| MethodError::Failed(format!("system clock before Unix epoch: {}", e)))?
        .as_secs();
    Ok(Value::from(secs))
}

pub fn reverse_string(params: &Params) -> Result<Value, MethodError> {
    let s = params.string("s")?;
    Ok(Value::String(s.chars().rev().collect()))
}

pub fn echo(params: &Params) -> Result<Value, MethodError> {
    Ok(params.clone().into_value())
}

fn operands(params: &Params) -> Result<(f64, f64), MethodError> {
    Ok((params.number("a")?, params.number("b")?))
}

/// Integral results go out as JSON integers, everything else as floats.
fn number(x: f64) -> Result<Value, MethodError> {
    if x.fract() == 0.0 && x.abs() <= MAX_SAFE_INTEGER {
        return Ok(Value::from(x as i64));
    }

    Number::from_f64(x)
        .map(Value::Number)
        .ok_or_else(|| MethodError::Failed(format!("result {} is not a finite number", x)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgramrpc_common::ParamError;
    use serde_json::json;

    fn ab(a: impl Into<Value>, b: impl Into<Value>) -> Params {
        Params::new().with("a", a).with("b", b)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(add(&ab(5, 7)).unwrap(), json!(12));
        assert_eq!(subtract(&ab(10, 3)).unwrap(), json!(7));
        assert_eq!(multiply(&ab(4, 6)).unwrap(), json!(24));
        assert_eq!(divide(&ab(15, 3)).unwrap(), json!(5));
    }

    #[test]
    fn test_fractional_results_stay_floats() {
        assert_eq!(divide(&ab(1, 4)).unwrap(), json!(0.25));
        assert_eq!(add(&ab(0.5, 0.25)).unwrap(), json!(0.75));
    }

    #[test]
    fn test_divide_by_zero() {
        let err = divide(&ab(5, 0)).unwrap_err();
        assert_eq!(err, MethodError::DivisionByZero);
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_non_numeric_operand_is_named() {
        let err = add(&ab("x", 1)).unwrap_err();
        assert!(err.to_string().contains("'a'"), "got: {}", err);

        let err = multiply(&ab(1, true)).unwrap_err();
        assert!(err.to_string().contains("'b'"), "got: {}", err);
    }

    #[test]
    fn test_missing_operand() {
        let err = subtract(&Params::new().with("a", 1)).unwrap_err();
        assert_eq!(err, MethodError::Param(ParamError::Missing("b".to_string())));
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(multiply(&ab(1e308, 10)).is_err());
    }

    #[test]
    fn test_reverse_string() {
        assert_eq!(reverse_string(&Params::new().with("s", "hello")).unwrap(), json!("olleh"));
        assert_eq!(reverse_string(&Params::new().with("s", "")).unwrap(), json!(""));
        assert_eq!(reverse_string(&Params::new().with("s", "añb")).unwrap(), json!("bña"));
    }

    #[test]
    fn test_reverse_string_rejects_non_strings() {
        let err = reverse_string(&Params::new().with("s", 5)).unwrap_err();
        assert_eq!(err.to_string(), "parameter 's' must be a string");
    }

    #[test]
    fn test_get_time_is_recent() {
        let t = get_time(&Params::new()).unwrap().as_u64().unwrap();
        assert!(t > 1_600_000_000);
    }

    #[test]
    fn test_echo_returns_params() {
        let params = Params::new().with("test", "data").with("number", 42);
        assert_eq!(echo(&params).unwrap(), json!({"test": "data", "number": 42}));
        assert_eq!(echo(&Params::new()).unwrap(), json!({}));
    }
}
