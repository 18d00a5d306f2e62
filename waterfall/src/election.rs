use core_types::money::MoneyError;
use rust_decimal::Decimal;

use crate::{model::ClassTerms, simulate::simulate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Elections {
    pub converted: Vec<bool>,
    pub passes: usize,
    pub settled: bool,
}

/// Payout to class `idx` if it converts and if it keeps its preference,
/// with every other class held to `converted`.
pub(crate) fn alternatives(
    classes: &[ClassTerms],
    converted: &[bool],
    proceeds: Decimal,
    idx: usize,
) -> Result<(Decimal, Decimal), MoneyError> {
    let mut scenario = converted.to_vec();
    scenario[idx] = true;
    let convert = simulate(classes, &scenario, proceeds)?[idx].total();
    scenario[idx] = false;
    let keep = simulate(classes, &scenario, proceeds)?[idx].total();
    Ok((convert, keep))
}

/// Walks the preferred classes senior first, letting each take the greater
/// of converting or keeping its preference given everyone else's current
/// choice. Repeats until a pass changes nothing or `max_passes` is spent.
pub(crate) fn elect(
    classes: &[ClassTerms],
    proceeds: Decimal,
    max_passes: usize,
) -> Result<Elections, MoneyError> {
    let mut converted = vec![false; classes.len()];
    let mut passes = 0;
    while passes < max_passes {
        passes += 1;
        let mut changed = false;
        for idx in 0..classes.len() {
            if !classes[idx].preferred {
                continue;
            }
            let (convert, keep) = alternatives(classes, &converted, proceeds, idx)?;
            let choice = convert > keep;
            if choice != converted[idx] {
                converted[idx] = choice;
                changed = true;
            }
        }
        if !changed {
            return Ok(Elections {
                converted,
                passes,
                settled: true,
            });
        }
    }
    Ok(Elections {
        converted,
        passes,
        settled: false,
    })
}
