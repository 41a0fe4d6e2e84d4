use intake_api::{ApiResult, DbClient, DbConfig};

/// Client for the database named by the `INTAKE_DB_*` variables, with the
/// schema in place.
pub async fn test_db_client() -> ApiResult<DbClient> {
    let config = DbConfig::from_env();
    let db = DbClient::from_config(&config)?;
    db.migrate().await?;
    Ok(db)
}

/// A payload number unlikely to collide with rows left by earlier runs.
pub fn unique_applicant_number() -> u32 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    nanos % 10_000
}
