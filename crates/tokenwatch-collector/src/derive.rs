//! Metric derivation: raw rows to gauge assignments.
//!
//! Pure and deterministic: the same rows always produce the same
//! assignments, in the same order.

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::query::QueryKind;
use crate::row::RawRow;

/// Rollout states of a token whose enrollment is not finished yet.
pub const PENDING_STATES: [&str; 2] = ["verify", "clientwait"];

/// `tokeninfo` key marking a token as a passkey credential.
pub const PASSKEY: &str = "passkey";

/// Suffix appended to the category of a pending token.
pub const PENDING_SUFFIX: &str = " pending";

pub const USERS_OK_LABEL: &str = "ok";
pub const USERS_INCOMPLETE_LABEL: &str = "incomplete";

/// Target gauge of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gauge {
    TokenCount,
    UserCount,
}

/// One derived gauge value.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub gauge: Gauge,
    pub label: String,
    pub value: f64,
}

pub fn is_pending(state: &str) -> bool {
    PENDING_STATES.contains(&state)
}

/// Category label of a token row.
///
/// Passkeys are reported as `passkey` whatever their token type; pending
/// tokens get the ` pending` suffix.
pub fn token_category(token_type: &str, state: &str, info_key: &str) -> String {
    let base = if info_key == PASSKEY { PASSKEY } else { token_type };
    if is_pending(state) {
        format!("{base}{PENDING_SUFFIX}")
    } else {
        base.to_string()
    }
}

/// Derive the assignments for the rows of one query.
pub fn derive(kind: QueryKind, rows: &[RawRow]) -> Result<Vec<Assignment>, DecodeError> {
    match kind {
        QueryKind::TokenDistribution => token_counts(rows),
        QueryKind::UsersOk => user_count(USERS_OK_LABEL, rows).map(|a| vec![a]),
        QueryKind::UsersIncomplete => user_count(USERS_INCOMPLETE_LABEL, rows).map(|a| vec![a]),
    }
}

/// Token counts per category.
///
/// Several rows can fold into the same category (passkeys of different
/// token types, or `verify` and `clientwait` of one type). Their counts are
/// summed so the gauge always holds the absolute total.
pub fn token_counts(rows: &[RawRow]) -> Result<Vec<Assignment>, DecodeError> {
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        row.expect_len(4)?;
        let category = token_category(row.text(0)?, row.text(1)?, row.text(2)?);
        *totals.entry(category).or_default() += row.count(3)?;
    }

    Ok(totals
        .into_iter()
        .map(|(label, count)| Assignment {
            gauge: Gauge::TokenCount,
            label,
            value: count as f64,
        })
        .collect())
}

/// A single distinct-user count. No row at all means zero users.
pub fn user_count(label: &str, rows: &[RawRow]) -> Result<Assignment, DecodeError> {
    let count = match rows {
        [] => 0,
        [row] => {
            row.expect_len(1)?;
            row.count(0)?
        }
        _ => {
            return Err(DecodeError::RowCount {
                expected: 1,
                actual: rows.len(),
            });
        }
    };

    Ok(Assignment {
        gauge: Gauge::UserCount,
        label: label.to_string(),
        value: count as f64,
    })
}
