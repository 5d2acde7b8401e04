//! Calculator tools: arithmetic, scientific functions, unit conversion.
//!
//! All pure. Domain errors (division by zero, negative square roots)
//! are reported as invalid input.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{
    CallContext, HandlerError, RegistryError, Schema, ToolDescriptor, ToolRegistry,
    ValidatedArguments,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, HandlerError> {
        match self {
            BinaryOp::Add => Ok(a + b),
            BinaryOp::Subtract => Ok(a - b),
            BinaryOp::Multiply => Ok(a * b),
            BinaryOp::Divide if b == 0.0 => Err(HandlerError::invalid_input("cannot divide by zero")),
            BinaryOp::Divide => Ok(a / b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Power,
    Sqrt,
    Log,
    Sin,
    Cos,
    Tan,
}

impl UnaryOp {
    fn name(self) -> &'static str {
        match self {
            UnaryOp::Power => "power",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
        }
    }

    fn apply(self, x: f64, args: &ValidatedArguments) -> Result<f64, HandlerError> {
        match self {
            UnaryOp::Power => Ok(x.powf(args.f64("y").unwrap_or(2.0))),
            UnaryOp::Sqrt if x < 0.0 => Err(HandlerError::invalid_input(
                "cannot take square root of negative number",
            )),
            UnaryOp::Sqrt => Ok(x.sqrt()),
            UnaryOp::Log => {
                if x <= 0.0 {
                    return Err(HandlerError::invalid_input(
                        "cannot take logarithm of non-positive number",
                    ));
                }
                let base = args.f64("base").unwrap_or(std::f64::consts::E);
                if base <= 0.0 || base == 1.0 {
                    return Err(HandlerError::invalid_input(
                        "logarithm base must be positive and not 1",
                    ));
                }
                Ok(x.ln() / base.ln())
            }
            UnaryOp::Sin => Ok(x.to_radians().sin()),
            UnaryOp::Cos => Ok(x.to_radians().cos()),
            UnaryOp::Tan => Ok(x.to_radians().tan()),
        }
    }
}

/// JSON number, integral when the value is integral.
pub(crate) fn number(x: f64) -> Value {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 9_007_199_254_740_992.0 {
        json!(x as i64)
    } else {
        json!(x)
    }
}

fn finite(op: &str, x: f64) -> Result<f64, HandlerError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(HandlerError::failed(format!("{op}: result is not a finite number")))
    }
}

async fn binary(op: BinaryOp, args: ValidatedArguments) -> Result<Value, HandlerError> {
    let a = args.f64("a").unwrap_or(0.0);
    let b = args.f64("b").unwrap_or(0.0);
    let result = finite(op.name(), op.apply(a, b)?)?;
    Ok(json!({
        "operation": op.name(),
        "inputs": { "a": number(a), "b": number(b) },
        "result": number(result),
        "formatted": format!("{a} {} {b} = {result}", op.name()),
    }))
}

async fn unary(op: UnaryOp, args: ValidatedArguments) -> Result<Value, HandlerError> {
    let x = args.f64("x").unwrap_or(0.0);
    let result = finite(op.name(), op.apply(x, &args)?)?;
    Ok(json!({
        "operation": op.name(),
        "input": number(x),
        "result": number(result),
        "formatted": format!("{}({x}) = {result}", op.name()),
    }))
}

// =============================================================================
// Unit conversion
// =============================================================================

#[derive(Debug, Deserialize)]
struct ConvertArgs {
    value: f64,
    from_unit: String,
    to_unit: String,
}

enum Conversion {
    Factor(f64),
    Affine(fn(f64) -> f64),
}

/// Direct conversions; the reverse direction is derived.
fn conversion(from: &str, to: &str) -> Option<Conversion> {
    use Conversion::*;
    let c = match (from, to) {
        ("mm", "cm") => Factor(0.1),
        ("cm", "m") => Factor(0.01),
        ("m", "km") => Factor(0.001),
        ("in", "ft") => Factor(1.0 / 12.0),
        ("ft", "yd") => Factor(1.0 / 3.0),
        ("yd", "mi") => Factor(1.0 / 1760.0),
        ("g", "kg") => Factor(0.001),
        ("kg", "lb") => Factor(2.20462),
        ("lb", "oz") => Factor(16.0),
        ("celsius", "fahrenheit") => Affine(|c| c * 9.0 / 5.0 + 32.0),
        ("fahrenheit", "celsius") => Affine(|f| (f - 32.0) * 5.0 / 9.0),
        ("celsius", "kelvin") => Affine(|c| c + 273.15),
        ("kelvin", "celsius") => Affine(|k| k - 273.15),
        _ => return None,
    };
    Some(c)
}

fn convert(value: f64, from: &str, to: &str) -> Option<f64> {
    if from == to {
        return Some(value);
    }
    match conversion(from, to) {
        Some(Conversion::Factor(f)) => Some(value * f),
        Some(Conversion::Affine(f)) => Some(f(value)),
        // Every affine pair is listed in both directions.
        None => match conversion(to, from)? {
            Conversion::Factor(f) => Some(value / f),
            Conversion::Affine(_) => None,
        },
    }
}

async fn convert_units(args: ValidatedArguments) -> Result<Value, HandlerError> {
    let ConvertArgs {
        value,
        from_unit,
        to_unit,
    } = args.parse()?;
    let from = from_unit.trim().to_lowercase();
    let to = to_unit.trim().to_lowercase();

    let converted = convert(value, &from, &to).ok_or_else(|| {
        HandlerError::invalid_input(format!("conversion from {from} to {to} not supported"))
    })?;

    Ok(json!({
        "original_value": number(value),
        "from_unit": from,
        "to_unit": to,
        "converted_value": number(converted),
        "formatted": format!("{value} {from} = {converted} {to}"),
    }))
}

// =============================================================================
// Registration
// =============================================================================

pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    let binaries = [
        (BinaryOp::Add, "Add two numbers together", "First number", "Second number"),
        (BinaryOp::Subtract, "Subtract second number from first number", "First number", "Second number"),
        (BinaryOp::Multiply, "Multiply two numbers", "First number", "Second number"),
        (BinaryOp::Divide, "Divide first number by second number", "Dividend", "Divisor (cannot be zero)"),
    ];
    for (op, description, a, b) in binaries {
        let schema = Schema::object()
            .required("a", Schema::number().describe(a))
            .required("b", Schema::number().describe(b));
        registry.register(
            ToolDescriptor::new(op.name(), description, schema),
            move |args: ValidatedArguments, _ctx: CallContext| binary(op, args),
        )?;
    }

    let angle = || Schema::object().required("x", Schema::number().describe("Angle in degrees"));
    let unaries = [
        (
            UnaryOp::Power,
            "Raise number to a power",
            Schema::object()
                .required("x", Schema::number().describe("Base number"))
                .optional(
                    "y",
                    Schema::number().describe("Exponent (default: 2)").default_value(json!(2)),
                ),
        ),
        (
            UnaryOp::Sqrt,
            "Calculate square root of a number",
            Schema::object().required(
                "x",
                Schema::number().describe("Number to find square root of (must be non-negative)"),
            ),
        ),
        (
            UnaryOp::Log,
            "Calculate logarithm of a number",
            Schema::object()
                .required(
                    "x",
                    Schema::number().describe("Number to find logarithm of (must be positive)"),
                )
                .optional(
                    "base",
                    Schema::number()
                        .describe("Base of logarithm (default: e)")
                        .default_value(json!(std::f64::consts::E)),
                ),
        ),
        (UnaryOp::Sin, "Calculate sine of angle (in degrees)", angle()),
        (UnaryOp::Cos, "Calculate cosine of angle (in degrees)", angle()),
        (UnaryOp::Tan, "Calculate tangent of angle (in degrees)", angle()),
    ];
    for (op, description, schema) in unaries {
        registry.register(
            ToolDescriptor::new(op.name(), description, schema),
            move |args: ValidatedArguments, _ctx: CallContext| unary(op, args),
        )?;
    }

    registry.register(
        ToolDescriptor::new(
            "convert_units",
            "Convert between different units of measurement",
            Schema::object()
                .required("value", Schema::number().describe("Value to convert"))
                .required("from_unit", Schema::string().describe("Source unit"))
                .required("to_unit", Schema::string().describe("Target unit")),
        ),
        |args: ValidatedArguments, _ctx: CallContext| convert_units(args),
    )?;
    Ok(())
}
