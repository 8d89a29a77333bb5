//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use std::collections::HashSet;

use mongodb::error::{
    Error as DbError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT,
};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Return true if the transaction that produced this error was aborted and
/// can be run again from scratch, e.g. after a write conflict.
pub fn is_transient_error(err: &DbError) -> bool {
    aborted_transaction(err.labels())
}

/// Return true if a commit may or may not have gone through. Only the commit
/// itself can be retried.
pub fn is_unknown_commit_result(err: &DbError) -> bool {
    err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
}

fn aborted_transaction(labels: &HashSet<String>) -> bool {
    labels.contains(TRANSIENT_TRANSACTION_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn only_aborted_transactions_rerun() {
        assert!(aborted_transaction(&labels(&[TRANSIENT_TRANSACTION_ERROR])));
        assert!(!aborted_transaction(&labels(&[
            UNKNOWN_TRANSACTION_COMMIT_RESULT
        ])));
        assert!(!aborted_transaction(&labels(&[])));
    }

    #[test]
    fn plain_errors_are_neither() {
        let err = DbError::custom("boom");
        assert!(!is_transient_error(&err));
        assert!(!is_unknown_commit_result(&err));
        assert!(!is_duplicate_key_error(&err));
    }
}
