use graphflow_primitives::{PropertyMap, ScalarValue};

use crate::ast::{CompareOp, CompiledQuery, Predicate};
use crate::error::EvalError;

/// Evaluates the compiled predicate against a node's (or a candidate
/// before/after attribute mapping's) properties. `None` predicate always
/// matches (§4.5 permits a bare `MATCH ... RETURN` with no `WHERE`).
pub fn evaluate_predicate(query: &CompiledQuery, properties: &PropertyMap) -> Result<bool, EvalError> {
    match &query.predicate {
        None => Ok(true),
        Some(pred) => evaluate(pred, properties),
    }
}

fn evaluate(predicate: &Predicate, properties: &PropertyMap) -> Result<bool, EvalError> {
    match predicate {
        Predicate::And(terms) => {
            for term in terms {
                if !evaluate(term, properties)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::NotExists { property } => {
            let falsy = properties.get(property).map(|v| v.is_falsy()).unwrap_or(true);
            Ok(falsy)
        }
        Predicate::Comparison { property, op, literal } => {
            let value = properties.get(property).cloned().unwrap_or(ScalarValue::Null);
            compare(&value, *op, literal)
        }
    }
}

fn compare(lhs: &ScalarValue, op: CompareOp, rhs: &ScalarValue) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => return Ok(lhs == rhs),
        CompareOp::Neq => return Ok(lhs != rhs),
        _ => {}
    }
    // Ordering comparisons require numerically or lexically compatible
    // operands; a type mismatch is an evaluation error that the processor
    // contains per-candidate (§7).
    let ordering = match (lhs, rhs) {
        (ScalarValue::Str(a), ScalarValue::Str(b)) => a.cmp(b),
        _ => {
            let (a, b) = (lhs.as_f64(), rhs.as_f64());
            match (a, b) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
                _ => {
                    return Err(EvalError::TypeMismatch {
                        lhs_type: lhs.type_name().to_string(),
                        rhs_type: rhs.type_name().to_string(),
                    })
                }
            }
        }
    };
    Ok(match op {
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Lte => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Gte => ordering.is_ge(),
        CompareOp::Eq | CompareOp::Neq => unreachable!(),
    })
}

/// Extracts the RETURN projection for a matched node (§4.5). A referenced
/// property missing from the node's attributes is an evaluation error
/// (there is no implicit null-projection in the MVP fragment), contained
/// per-candidate by the processor.
pub fn project(query: &CompiledQuery, properties: &PropertyMap) -> Result<PropertyMap, EvalError> {
    let mut out = PropertyMap::new();
    for item in &query.projection {
        let value = properties
            .get(&item.property)
            .cloned()
            .ok_or_else(|| EvalError::MissingProperty {
                property: item.property.clone(),
            })?;
        out.insert(item.alias.clone(), value);
    }
    Ok(out)
}
