use crate::db::query::{self, Arg};
use crate::model::{Filter, Owner, Vehicle, VehiclePatch, VehicleWithOwner};
use anyhow::Result;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

pub type Pool = SqlitePool;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Pool acquisition bound so a wedged store surfaces as an error instead of
/// hanging the request.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage failure classes callers branch on. Raw driver errors stay inside
/// `Unavailable`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("registration number {0} is already registered")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Result of a patch that resolved its target id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Updated,
    NoChange,
}

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePoolOptions::new()
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&normalized)
        .await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, q) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match q {
        Some(q) => format!("sqlite://{expanded}?{q}"),
        None => format!("sqlite://{expanded}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn bind_arg(query: SqliteQuery<'_>, arg: Arg) -> SqliteQuery<'_> {
    match arg {
        Arg::Text(v) => query.bind(v),
        Arg::Int(v) => query.bind(v),
        Arg::Null => query.bind(None::<String>),
    }
}

/// Registers a vehicle together with its owner. Both inserts run in one
/// transaction so a failed vehicle insert cannot leave an orphaned owner row.
#[instrument(skip_all)]
pub async fn add_vehicle(
    pool: &Pool,
    car: &Vehicle,
    enforce_unique_reg: bool,
) -> Result<i64, StorageError> {
    let mut tx = pool.begin().await?;

    if enforce_unique_reg {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM vehicles WHERE reg_num = ?")
                .bind(&car.reg_num)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StorageError::Conflict(car.reg_num.clone()));
        }
    }

    let owner_id: i64 = sqlx::query(
        "INSERT INTO owners (name, surname, patronymic) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(&car.owner.name)
    .bind(&car.owner.surname)
    .bind(&car.owner.patronymic)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    let car_id: i64 = sqlx::query(
        "INSERT INTO vehicles (reg_num, mark, model, year, owner_id) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&car.reg_num)
    .bind(&car.mark)
    .bind(&car.model)
    .bind(car.year)
    .bind(owner_id)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    tx.commit().await?;
    Ok(car_id)
}

/// Deletes a vehicle and its owner row in one transaction.
#[instrument(skip_all)]
pub async fn delete_vehicle(pool: &Pool, car_id: i64) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    let owner_id: Option<i64> = sqlx::query_scalar("SELECT owner_id FROM vehicles WHERE id = ?")
        .bind(car_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(owner_id) = owner_id else {
        return Err(StorageError::NotFound);
    };

    let deleted = sqlx::query("DELETE FROM vehicles WHERE id = ?")
        .bind(car_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }

    sqlx::query("DELETE FROM owners WHERE id = ?")
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

const LIST_COLUMNS: &str = "vehicles.id AS id, vehicles.reg_num AS reg_num, \
     vehicles.mark AS mark, vehicles.model AS model, vehicles.year AS year, \
     owners.name AS name, owners.surname AS surname, owners.patronymic AS patronymic";

/// Offset-paginated, filtered listing. Ordered by vehicle id ascending so
/// pagination is stable against an unchanged data set. Callers validate
/// `page_size >= 1` and `page_token >= 1`.
#[instrument(skip_all)]
pub async fn list_vehicles(
    pool: &Pool,
    page_size: i64,
    page_token: i64,
    filter: &Filter,
) -> Result<Vec<VehicleWithOwner>, StorageError> {
    let preds = query::filter_predicates(filter);
    let sql = format!(
        "SELECT {LIST_COLUMNS} FROM vehicles JOIN owners ON vehicles.owner_id = owners.id{} \
         ORDER BY vehicles.id ASC LIMIT ? OFFSET ?",
        preds.where_clause()
    );

    // Saturate so extreme page_size/page_token pairs land past the end of
    // the data set instead of overflowing.
    let offset = page_token.saturating_sub(1).saturating_mul(page_size);
    let mut q = sqlx::query(&sql);
    for arg in preds.args {
        q = bind_arg(q, arg);
    }
    q = q.bind(page_size).bind(offset);

    let rows = q.fetch_all(pool).await?;
    Ok(rows.into_iter().map(row_to_vehicle).collect())
}

/// Total row count under the same predicate set as [`list_vehicles`].
#[instrument(skip_all)]
pub async fn count_vehicles(pool: &Pool, filter: &Filter) -> Result<i64, StorageError> {
    let preds = query::filter_predicates(filter);
    let sql = format!(
        "SELECT COUNT(vehicles.id) AS total FROM vehicles \
         JOIN owners ON vehicles.owner_id = owners.id{}",
        preds.where_clause()
    );

    let mut q = sqlx::query(&sql);
    for arg in preds.args {
        q = bind_arg(q, arg);
    }
    let row = q.fetch_one(pool).await?;
    Ok(row.get("total"))
}

/// Applies the owner-side and vehicle-side assignment sets in one
/// transaction. A patch with nothing present on either side is a recognized
/// no-op; a side that resolves zero rows means the vehicle id does not exist
/// and the whole operation rolls back as `NotFound`.
#[instrument(skip_all)]
pub async fn patch_vehicle(
    pool: &Pool,
    car_id: i64,
    patch: &VehiclePatch,
) -> Result<PatchOutcome, StorageError> {
    let owner_set = query::owner_assignments(&patch.owner);
    let vehicle_set = query::vehicle_assignments(patch);
    if owner_set.is_none() && vehicle_set.is_none() {
        return Ok(PatchOutcome::NoChange);
    }

    let mut tx = pool.begin().await?;

    if let Some(set) = owner_set {
        let sql = format!(
            "UPDATE owners SET {} WHERE id = (SELECT owner_id FROM vehicles WHERE id = ?)",
            set.set_clause()
        );
        let mut q = sqlx::query(&sql);
        for arg in set.args {
            q = bind_arg(q, arg);
        }
        let updated = q.bind(car_id).execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
    }

    if let Some(set) = vehicle_set {
        let sql = format!("UPDATE vehicles SET {} WHERE id = ?", set.set_clause());
        let mut q = sqlx::query(&sql);
        for arg in set.args {
            q = bind_arg(q, arg);
        }
        let updated = q.bind(car_id).execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
    }

    tx.commit().await?;
    Ok(PatchOutcome::Updated)
}

fn row_to_vehicle(row: SqliteRow) -> VehicleWithOwner {
    VehicleWithOwner {
        id: row.get("id"),
        reg_num: row.get("reg_num"),
        mark: row.get("mark"),
        model: row.get("model"),
        year: row.get("year"),
        owner: Owner {
            name: row.get("name"),
            surname: row.get("surname"),
            patronymic: row.get("patronymic"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;

    fn sample_car(reg_num: &str) -> Vehicle {
        Vehicle {
            reg_num: reg_num.to_string(),
            mark: "Lada".to_string(),
            model: "Vesta".to_string(),
            year: Some(2002),
            owner: Owner {
                name: "Ivan".to_string(),
                surname: "Ivanov".to_string(),
                patronymic: Some("Ivanovich".to_string()),
            },
        }
    }

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://host/db"),
            "postgres://host/db"
        );
        assert_eq!(
            prepare_sqlite_url("sqlite:///tmp/cars.db?mode=rwc"),
            "sqlite:///tmp/cars.db?mode=rwc"
        );
    }

    #[tokio::test]
    async fn add_creates_owner_and_vehicle_rows() {
        let pool = setup_pool().await;
        let id = add_vehicle(&pool, &sample_car("X123XX150"), false)
            .await
            .unwrap();

        let cars = list_vehicles(&pool, 100, 1, &Filter::default())
            .await
            .unwrap();
        assert_eq!(cars.len(), 1);
        assert_eq!(cars[0].id, id);
        assert_eq!(cars[0].reg_num, "X123XX150");
        assert_eq!(cars[0].owner.name, "Ivan");
    }

    #[tokio::test]
    async fn duplicate_reg_num_conflicts_when_enforced() {
        let pool = setup_pool().await;
        add_vehicle(&pool, &sample_car("X123XX150"), true)
            .await
            .unwrap();

        let err = add_vehicle(&pool, &sample_car("X123XX150"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // Not enforced by default.
        add_vehicle(&pool, &sample_car("X123XX150"), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn patch_of_missing_vehicle_rolls_back() {
        let pool = setup_pool().await;
        let patch = VehiclePatch {
            mark: Field::Value("Volga".to_string()),
            ..VehiclePatch::default()
        };
        let err = patch_vehicle(&pool, 404, &patch).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn patch_sets_explicit_null() {
        let pool = setup_pool().await;
        let id = add_vehicle(&pool, &sample_car("A001AA01"), false)
            .await
            .unwrap();

        let patch = VehiclePatch {
            year: Field::Null,
            owner: crate::model::OwnerPatch {
                patronymic: Field::Null,
                ..Default::default()
            },
            ..VehiclePatch::default()
        };
        let outcome = patch_vehicle(&pool, id, &patch).await.unwrap();
        assert_eq!(outcome, PatchOutcome::Updated);

        let cars = list_vehicles(&pool, 1, 1, &Filter::default()).await.unwrap();
        assert_eq!(cars[0].year, None);
        assert_eq!(cars[0].owner.patronymic, None);
    }
}
