//! Folio Expressions
//!
//! Computed values used by `$group` keys, accumulators and `$project`
//! fields: field paths (`"$published_year"`), literals, nested objects and
//! the arithmetic operators.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::QueryError;
use crate::types::{Document, Value};

// =============================================================================
// Expression
// =============================================================================

/// A parsed aggregation expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Add(Vec<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Multiply(Vec<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse an expression from its document form.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::String(s) => match s.strip_prefix('$') {
                Some("") => Err(QueryError::InvalidExpression(
                    "empty field path".to_string(),
                )),
                Some(path) => Ok(Self::Field(path.to_string())),
                None => Ok(Self::Literal(value.clone())),
            },
            Value::Array(items) => Ok(Self::Array(
                items.iter().map(Self::parse).collect::<Result<_, _>>()?,
            )),
            Value::Object(doc) => Self::parse_object(doc),
            _ => Ok(Self::Literal(value.clone())),
        }
    }

    fn parse_object(doc: &Document) -> Result<Self, QueryError> {
        let (operator, args) = match doc.first() {
            Some((key, args)) if key.starts_with('$') => (key, args),
            _ => {
                let fields = doc
                    .iter()
                    .map(|(k, v)| Ok((k.to_string(), Self::parse(v)?)))
                    .collect::<Result<Vec<_>, QueryError>>()?;
                return Ok(Self::Object(fields));
            }
        };

        if doc.len() != 1 {
            return Err(QueryError::InvalidExpression(format!(
                "operator {} must be the only field in its object",
                operator
            )));
        }

        match operator {
            "$literal" => Ok(Self::Literal(args.clone())),
            "$add" => Ok(Self::Add(parse_args(operator, args)?)),
            "$multiply" => Ok(Self::Multiply(parse_args(operator, args)?)),
            "$subtract" => {
                let (a, b) = parse_pair(operator, args)?;
                Ok(Self::Subtract(a, b))
            }
            "$divide" => {
                let (a, b) = parse_pair(operator, args)?;
                Ok(Self::Divide(a, b))
            }
            "$mod" => {
                let (a, b) = parse_pair(operator, args)?;
                Ok(Self::Mod(a, b))
            }
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }

    /// Evaluate against a document. Missing fields evaluate to null.
    pub fn evaluate(&self, doc: &Document) -> Result<Value, QueryError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Field(path) => Ok(doc.get(path).cloned().unwrap_or(Value::Null)),
            Self::Object(fields) => {
                let mut out = Document::new();
                for (name, expr) in fields {
                    out.set(name.clone(), expr.evaluate(doc)?);
                }
                Ok(Value::Object(out))
            }
            Self::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|e| e.evaluate(doc))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Add(items) => fold_numbers(items, doc, Value::Int(0), |a, b| {
                arithmetic(a, b, i64::checked_add, |x, y| x + y)
            }),
            Self::Multiply(items) => fold_numbers(items, doc, Value::Int(1), |a, b| {
                arithmetic(a, b, i64::checked_mul, |x, y| x * y)
            }),
            Self::Subtract(a, b) => binary(a, b, doc, |a, b| {
                arithmetic(a, b, i64::checked_sub, |x, y| x - y)
            }),
            Self::Divide(a, b) => binary(a, b, doc, |a, b| {
                let divisor = number(b)?;
                if divisor == 0.0 {
                    return Err(QueryError::DivisionByZero);
                }
                Ok(Value::Float(number(a)? / divisor))
            }),
            Self::Mod(a, b) => binary(a, b, doc, |a, b| match (a, b) {
                (Value::Int(_), Value::Int(0)) => Err(QueryError::DivisionByZero),
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_rem(*y))),
                _ => {
                    let divisor = number(b)?;
                    if divisor == 0.0 {
                        return Err(QueryError::DivisionByZero);
                    }
                    Ok(Value::Float(number(a)? % divisor))
                }
            }),
        }
    }

    /// Returns the field path when the expression is a bare field reference.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(path) => Some(path),
            _ => None,
        }
    }
}

fn parse_args(operator: &str, args: &Value) -> Result<Vec<Expr>, QueryError> {
    match args {
        Value::Array(items) => items.iter().map(Expr::parse).collect(),
        _ => Err(QueryError::InvalidExpression(format!(
            "{} expects an array of arguments",
            operator
        ))),
    }
}

fn parse_pair(operator: &str, args: &Value) -> Result<(Box<Expr>, Box<Expr>), QueryError> {
    match args {
        Value::Array(items) if items.len() == 2 => Ok((
            Box::new(Expr::parse(&items[0])?),
            Box::new(Expr::parse(&items[1])?),
        )),
        _ => Err(QueryError::InvalidExpression(format!(
            "{} expects exactly two arguments",
            operator
        ))),
    }
}

pub(crate) fn number(value: &Value) -> Result<f64, QueryError> {
    value.as_f64().ok_or_else(|| QueryError::TypeMismatch {
        expected: "number".to_string(),
        actual: value.type_name().to_string(),
    })
}

/// Integer arithmetic when both sides are integers and the result fits,
/// floating point otherwise.
pub(crate) fn arithmetic(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, QueryError> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        if let Some(n) = int_op(*x, *y) {
            return Ok(Value::Int(n));
        }
    }
    Ok(Value::Float(float_op(number(a)?, number(b)?)))
}

fn binary(
    a: &Expr,
    b: &Expr,
    doc: &Document,
    op: impl Fn(&Value, &Value) -> Result<Value, QueryError>,
) -> Result<Value, QueryError> {
    let a = a.evaluate(doc)?;
    let b = b.evaluate(doc)?;
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    op(&a, &b)
}

fn fold_numbers(
    items: &[Expr],
    doc: &Document,
    init: Value,
    op: impl Fn(&Value, &Value) -> Result<Value, QueryError>,
) -> Result<Value, QueryError> {
    let mut acc = init;
    for item in items {
        let value = item.evaluate(doc)?;
        if value.is_null() {
            return Ok(Value::Null);
        }
        acc = op(&acc, &value)?;
    }
    Ok(acc)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn parse(value: impl Into<Value>) -> Expr {
        Expr::parse(&value.into()).unwrap()
    }

    #[test]
    fn test_field_and_literal() {
        let book = doc! { "title": "Dune", "published_year": 1965 };

        assert_eq!(parse("$title").evaluate(&book).unwrap(), Value::from("Dune"));
        assert_eq!(parse("plain").evaluate(&book).unwrap(), Value::from("plain"));
        assert_eq!(parse("$missing").evaluate(&book).unwrap(), Value::Null);
        assert_eq!(parse(7).evaluate(&book).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_decade_expression() {
        let expr = parse(doc! {
            "$subtract": vec![
                Value::from("$published_year"),
                Value::from(doc! { "$mod": vec![Value::from("$published_year"), Value::from(10)] }),
            ]
        });

        let book = doc! { "published_year": 2015 };
        assert_eq!(expr.evaluate(&book).unwrap(), Value::Int(2010));

        let book = doc! { "published_year": 1813 };
        assert_eq!(expr.evaluate(&book).unwrap(), Value::Int(1810));

        let book = doc! { "title": "no year" };
        assert_eq!(expr.evaluate(&book).unwrap(), Value::Null);
    }

    #[test]
    fn test_arithmetic_types() {
        let book = doc! { "price": 10.5, "qty": 3 };

        let total = parse(doc! { "$multiply": vec![Value::from("$price"), Value::from("$qty")] });
        assert_eq!(total.evaluate(&book).unwrap(), Value::Float(31.5));

        let sum = parse(doc! { "$add": vec![Value::from("$qty"), Value::from(4)] });
        assert_eq!(sum.evaluate(&book).unwrap(), Value::Int(7));

        let half = parse(doc! { "$divide": vec![Value::from("$qty"), Value::from(2)] });
        assert_eq!(half.evaluate(&book).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_division_by_zero() {
        let book = doc! { "qty": 3 };
        let expr = parse(doc! { "$mod": vec![Value::from("$qty"), Value::from(0)] });
        assert_eq!(expr.evaluate(&book), Err(QueryError::DivisionByZero));

        let expr = parse(doc! { "$divide": vec![Value::from("$qty"), Value::from(0.0)] });
        assert_eq!(expr.evaluate(&book), Err(QueryError::DivisionByZero));
    }

    #[test]
    fn test_type_mismatch() {
        let book = doc! { "title": "Emma" };
        let expr = parse(doc! { "$add": vec![Value::from("$title"), Value::from(1)] });
        assert!(matches!(
            expr.evaluate(&book),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_object_expression() {
        let book = doc! { "author": "Jane Austen", "published_year": 1813 };
        let expr = parse(doc! { "who": "$author", "when": "$published_year" });
        let value = expr.evaluate(&book).unwrap();
        assert_eq!(
            value,
            Value::from(doc! { "who": "Jane Austen", "when": 1813 })
        );
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(matches!(
            Expr::parse(&Value::from(doc! { "$pow": vec![Value::from(2)] })),
            Err(QueryError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            Expr::parse(&Value::from(doc! { "$subtract": vec![Value::from(1)] })),
            Err(QueryError::InvalidExpression(_))
        ));
        assert!(matches!(
            Expr::parse(&Value::from("$")),
            Err(QueryError::InvalidExpression(_))
        ));
    }
}
