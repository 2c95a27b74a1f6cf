//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for the domain crates:
//! - `TestDatabase`: pgvector PostgreSQL container with migrations applied (feature: "postgres")
//! - `TestDataBuilder`: Deterministic test data generation (always available)
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let user_id = builder.user_id();
//!     let conversation_id = builder.conversation_id();
//! }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{PGVECTOR_IMAGE, PGVECTOR_TAG, TestDatabase};

/// Builder for deterministic test identifiers
///
/// Ids are derived from a seed so reruns of the same test produce the same
/// rows, and different tests never collide.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_backfill_messages");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    pub fn user_id(&self) -> String {
        self.id("user")
    }

    pub fn other_user_id(&self) -> String {
        self.id("user-other")
    }

    pub fn conversation_id(&self) -> String {
        self.id("conv")
    }

    /// Id of the form `{prefix}-{seed:016x}`.
    ///
    /// Ids sharing a prefix sort in creation order when suffixed with
    /// [`seq`](Self::seq).
    pub fn id(&self, prefix: &str) -> String {
        format!("{}-{:016x}", prefix, self.seed)
    }

    /// `n`-th id under `prefix`, zero-padded so lexical order matches `n`.
    pub fn seq(&self, prefix: &str, n: usize) -> String {
        format!("{}-{:04}", self.id(prefix), n)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert that `a` and `b` differ by at most `epsilon`.
    pub fn assert_close(a: f64, b: f64, epsilon: f64, context: &str) {
        assert!(
            (a - b).abs() <= epsilon,
            "{}: expected {} to be within {} of {}",
            context,
            a,
            epsilon,
            b
        );
    }

    /// Assert that `values` is sorted in descending order.
    pub fn assert_descending(values: &[f64], context: &str) {
        assert!(
            values.windows(2).all(|w| w[0] >= w[1]),
            "{}: expected descending order, got {:?}",
            context,
            values
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.user_id(), builder2.user_id());
        assert_eq!(builder1.seq("msg", 3), builder2.seq("msg", 3));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.user_id(), builder2.user_id());
        assert_ne!(builder1.user_id(), builder1.other_user_id());
    }

    #[test]
    fn test_seq_sorts_in_order() {
        let builder = TestDataBuilder::new(7);
        assert!(builder.seq("msg", 2) < builder.seq("msg", 10));
    }

    #[test]
    fn test_assertions() {
        assertions::assert_close(66.666, 66.67, 0.01, "rounding");
        assertions::assert_descending(&[0.9, 0.8, 0.8], "order");
        assert_eq!(assertions::assert_some(Some(1), "value"), 1);
    }
}
