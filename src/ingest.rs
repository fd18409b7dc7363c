//! Batch ingestion: resolve each registration number against the lookup
//! service and persist the result, one item at a time in input order.
//!
//! Items are independent: a failed lookup or insert never aborts the rest of
//! the batch. The overall outcome is classified only after every item has
//! been processed.

use crate::db::{self, Pool, StorageError};
use crate::lookup::LookupService;
use crate::model::Vehicle;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Successfully ingested registration number with its new vehicle id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreatedCar {
    pub reg_num: String,
    pub id: i64,
}

/// Failed registration number with its reason and HTTP-equivalent status.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedCar {
    pub reg_num: String,
    pub status: u16,
    pub message: String,
}

/// Per-batch result. Both lists preserve the input order of their items.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub created: Vec<CreatedCar>,
    pub failed: Vec<FailedCar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    FullSuccess,
    Partial,
    /// Every item failed; carries the first failure's status class.
    TotalFailure {
        status: u16,
    },
}

impl BatchReport {
    /// Classifies the batch after all items are processed. An empty batch
    /// has zero failures and counts as full success.
    pub fn outcome(&self) -> BatchOutcome {
        if self.failed.is_empty() {
            BatchOutcome::FullSuccess
        } else if self.created.is_empty() {
            BatchOutcome::TotalFailure {
                status: self.failed[0].status,
            }
        } else {
            BatchOutcome::Partial
        }
    }
}

fn storage_status(err: &StorageError) -> u16 {
    match err {
        StorageError::Conflict(_) => 409,
        StorageError::NotFound | StorageError::Unavailable(_) => 500,
    }
}

/// Resolves and persists each registration number sequentially, recording a
/// success or failure per item.
#[instrument(skip_all, fields(batch_size = reg_nums.len()))]
pub async fn ingest_registrations(
    pool: &Pool,
    lookup: &dyn LookupService,
    reg_nums: &[String],
    enforce_unique_reg: bool,
) -> BatchReport {
    let mut report = BatchReport::default();

    for reg_num in reg_nums {
        let car: Vehicle = match lookup.resolve(reg_num).await {
            Ok(car) => car,
            Err(err) => {
                warn!(%reg_num, status = err.status_class(), %err, "lookup failed");
                report.failed.push(FailedCar {
                    reg_num: reg_num.clone(),
                    status: err.status_class(),
                    message: err.to_string(),
                });
                continue;
            }
        };

        match db::add_vehicle(pool, &car, enforce_unique_reg).await {
            Ok(id) => {
                info!(%reg_num, id, "registered vehicle");
                report.created.push(CreatedCar {
                    reg_num: reg_num.clone(),
                    id,
                });
            }
            Err(err) => {
                warn!(%reg_num, %err, "failed to persist vehicle");
                report.failed.push(FailedCar {
                    reg_num: reg_num.clone(),
                    status: storage_status(&err),
                    message: err.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(reg_num: &str, id: i64) -> CreatedCar {
        CreatedCar {
            reg_num: reg_num.to_string(),
            id,
        }
    }

    fn failed(reg_num: &str, status: u16) -> FailedCar {
        FailedCar {
            reg_num: reg_num.to_string(),
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn outcome_classification() {
        let report = BatchReport::default();
        assert_eq!(report.outcome(), BatchOutcome::FullSuccess);

        let report = BatchReport {
            created: vec![created("A", 1)],
            failed: vec![],
        };
        assert_eq!(report.outcome(), BatchOutcome::FullSuccess);

        let report = BatchReport {
            created: vec![created("A", 1)],
            failed: vec![failed("B", 404)],
        };
        assert_eq!(report.outcome(), BatchOutcome::Partial);

        // Total failure reports the first failure's status, deterministically.
        let report = BatchReport {
            created: vec![],
            failed: vec![failed("A", 404), failed("B", 500)],
        };
        assert_eq!(
            report.outcome(),
            BatchOutcome::TotalFailure { status: 404 }
        );
    }
}
