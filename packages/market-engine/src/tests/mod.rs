
// --- Unit Tests ---
pub mod unit {
    pub mod ledger_test;
    pub mod listing_test;
    pub mod offer_test;
    pub mod platform_test;
    pub mod registry_test;
    pub mod settlement_test;
}
