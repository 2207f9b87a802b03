//! Methods of the tx class

use crate::definitions::class::TX;

empty_method! {
    /// Put the channel in transaction mode
    Select, TX, 10
}

empty_method! {
    /// Confirm transaction mode
    SelectOk, TX, 11
}

empty_method! {
    /// Commit the current transaction
    Commit, TX, 20
}

empty_method! {
    /// Confirm a successful commit
    CommitOk, TX, 21
}

empty_method! {
    /// Abandon the current transaction
    Rollback, TX, 30
}

empty_method! {
    /// Confirm a successful rollback
    RollbackOk, TX, 31
}
