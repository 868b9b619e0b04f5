//! The fixed set of aggregate queries run by every cycle.
//!
//! The SQL is written against the eduMFA schema (`token`, `tokeninfo`,
//! `tokenowner`) and sticks to syntax that MySQL/MariaDB and SQLite both
//! accept. A `NULL` rollout state is treated as not pending.

/// Which derivation rule consumes a query's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Rows of (tokentype, rollout_state, passkey_key, count).
    TokenDistribution,
    /// A single (count) row: users with at least one finished token.
    UsersOk,
    /// A single (count) row: users whose tokens are all pending.
    UsersIncomplete,
}

/// A named, parameterless, read-only query.
#[derive(Debug, Clone, Copy)]
pub struct Query {
    pub name: &'static str,
    pub kind: QueryKind,
    pub sql: &'static str,
}

pub const TOKEN_DISTRIBUTION: Query = Query {
    name: "token_distribution",
    kind: QueryKind::TokenDistribution,
    sql: "SELECT token.tokentype, IFNULL(token.rollout_state, ''), IFNULL(tokeninfo.Key, ''), COUNT(*) \
          FROM token \
          LEFT JOIN tokeninfo ON token.id = tokeninfo.token_id AND tokeninfo.Key = 'passkey' \
          GROUP BY token.tokentype, tokeninfo.Key, token.rollout_state",
};

pub const USERS_OK: Query = Query {
    name: "users_ok",
    kind: QueryKind::UsersOk,
    sql: "SELECT COUNT(DISTINCT tokenowner.user_id) \
          FROM tokenowner \
          JOIN token ON token.id = tokenowner.token_id \
          WHERE IFNULL(token.rollout_state, '') NOT IN ('verify', 'clientwait')",
};

pub const USERS_INCOMPLETE: Query = Query {
    name: "users_incomplete",
    kind: QueryKind::UsersIncomplete,
    sql: "SELECT COUNT(DISTINCT tokenowner.user_id) \
          FROM tokenowner \
          JOIN token ON token.id = tokenowner.token_id \
          WHERE token.rollout_state IN ('verify', 'clientwait') \
          AND tokenowner.user_id NOT IN ( \
              SELECT owner.user_id \
              FROM tokenowner owner \
              JOIN token done ON done.id = owner.token_id \
              WHERE IFNULL(done.rollout_state, '') NOT IN ('verify', 'clientwait') \
              AND owner.user_id IS NOT NULL)",
};

/// Every cycle runs these in order and stops at the first failure.
pub const QUERIES: [Query; 3] = [TOKEN_DISTRIBUTION, USERS_OK, USERS_INCOMPLETE];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_have_unique_names() {
        let mut names: Vec<&str> = QUERIES.iter().map(|q| q.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), QUERIES.len());
    }

    #[test]
    fn token_distribution_runs_first() {
        assert_eq!(QUERIES[0].kind, QueryKind::TokenDistribution);
    }

    #[test]
    fn queries_are_read_only() {
        for q in QUERIES {
            assert!(q.sql.trim_start().starts_with("SELECT"), "{} is not a SELECT", q.name);
        }
    }
}
