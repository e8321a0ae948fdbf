/// Dimension Resolution Module
///
/// Maps natural keys (aircraft icao24 codes, origin country names) to
/// warehouse surrogate keys, creating missing dimension rows exactly once
/// per key. A process-wide cache fronts the dimension tables; the tables
/// stay authoritative.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use sqlx::PgConnection;

use crate::etl::EtlError;

const AIRCRAFT_SELECT_SQL: &str =
    "SELECT aircraft_id AS id, icao24 AS natural_key FROM dim_aircraft WHERE icao24 = ANY($1)";

const AIRCRAFT_INSERT_SQL: &str = "INSERT INTO dim_aircraft (icao24) \
     SELECT key FROM UNNEST($1::TEXT[]) AS t(key) \
     ON CONFLICT (icao24) DO NOTHING \
     RETURNING aircraft_id AS id, icao24 AS natural_key";

const AIRCRAFT_TOUCH_SQL: &str = "UPDATE dim_aircraft SET last_seen = NOW() WHERE icao24 = ANY($1)";

const COUNTRY_SELECT_SQL: &str =
    "SELECT country_id AS id, country_name AS natural_key FROM dim_country WHERE country_name = ANY($1)";

const COUNTRY_INSERT_SQL: &str = "INSERT INTO dim_country (country_name) \
     SELECT key FROM UNNEST($1::TEXT[]) AS t(key) \
     ON CONFLICT (country_name) DO NOTHING \
     RETURNING country_id AS id, country_name AS natural_key";

/// A dimension row as returned by the lookup and insert statements.
#[derive(Debug, sqlx::FromRow)]
struct DimensionRow {
    id: i32,
    natural_key: String,
}

/// Process-wide natural-key -> surrogate-key cache for both dimensions.
///
/// One coarse lock covers the read-then-write sections on both maps;
/// lookups are cheap next to the network round trips they save. Entries
/// are never evicted and a key's surrogate never changes once written.
#[derive(Debug, Default)]
pub struct DimensionCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    aircraft: HashMap<String, i32>,
    countries: HashMap<String, i32>,
}

impl DimensionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `keys` into cached hits and misses for the aircraft dimension.
    pub fn partition_aircraft(&self, keys: &[String]) -> (HashMap<String, i32>, Vec<String>) {
        let inner = self.inner.lock().expect("dimension cache lock poisoned");
        partition(&inner.aircraft, keys)
    }

    /// Split `keys` into cached hits and misses for the country dimension.
    pub fn partition_countries(&self, keys: &[String]) -> (HashMap<String, i32>, Vec<String>) {
        let inner = self.inner.lock().expect("dimension cache lock poisoned");
        partition(&inner.countries, keys)
    }

    /// Record resolved aircraft entries. A key already present keeps its
    /// original surrogate: assignments are immutable.
    pub fn store_aircraft(&self, entries: &HashMap<String, i32>) {
        let mut inner = self.inner.lock().expect("dimension cache lock poisoned");
        store(&mut inner.aircraft, entries);
    }

    /// Record resolved country entries, first assignment wins.
    pub fn store_countries(&self, entries: &HashMap<String, i32>) {
        let mut inner = self.inner.lock().expect("dimension cache lock poisoned");
        store(&mut inner.countries, entries);
    }
}

fn partition(cached: &HashMap<String, i32>, keys: &[String]) -> (HashMap<String, i32>, Vec<String>) {
    let mut hits = HashMap::new();
    let mut misses = Vec::new();

    for key in keys {
        match cached.get(key) {
            Some(&id) => {
                hits.insert(key.clone(), id);
            }
            None => misses.push(key.clone()),
        }
    }

    (hits, misses)
}

fn store(cached: &mut HashMap<String, i32>, entries: &HashMap<String, i32>) {
    for (key, &id) in entries {
        cached.entry(key.clone()).or_insert(id);
    }
}

/// Deduplicate keys preserving first-seen order, dropping blank keys so
/// they never create a dimension row.
fn distinct_keys(keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.iter().filter(|key| !key.trim().is_empty()).filter(|key| seen.insert(key.as_str())).cloned().collect()
}

/// Resolve aircraft icao24 codes to surrogate keys, creating missing
/// dimension rows.
///
/// Every non-blank input key gets an entry in the returned map, and
/// last_seen is touched for all of them whether or not they were cached.
pub async fn resolve_aircraft(
    conn: &mut PgConnection,
    cache: &DimensionCache,
    keys: &[String],
) -> Result<HashMap<String, i32>, EtlError> {
    let keys = distinct_keys(keys);
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let (mut resolved, missing) = cache.partition_aircraft(&keys);

    if !missing.is_empty() {
        let fetched = resolve_missing(conn, &missing, AIRCRAFT_SELECT_SQL, AIRCRAFT_INSERT_SQL)
            .await
            .map_err(EtlError::Resolve)?;
        cache.store_aircraft(&fetched);
        resolved.extend(fetched);
    }

    sqlx::query(AIRCRAFT_TOUCH_SQL).bind(&keys).execute(&mut *conn).await.map_err(EtlError::Resolve)?;

    Ok(resolved)
}

/// Resolve origin country names to surrogate keys, creating missing
/// dimension rows. Blank names never reach the store.
pub async fn resolve_countries(
    conn: &mut PgConnection,
    cache: &DimensionCache,
    keys: &[String],
) -> Result<HashMap<String, i32>, EtlError> {
    let keys = distinct_keys(keys);
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let (mut resolved, missing) = cache.partition_countries(&keys);

    if !missing.is_empty() {
        let fetched = resolve_missing(conn, &missing, COUNTRY_SELECT_SQL, COUNTRY_INSERT_SQL)
            .await
            .map_err(EtlError::Resolve)?;
        cache.store_countries(&fetched);
        resolved.extend(fetched);
    }

    Ok(resolved)
}

/// Look up `missing` keys in the store, bulk-inserting any that do not
/// exist yet.
///
/// Concurrent resolvers racing to create the same key are settled by
/// ON CONFLICT DO NOTHING: only the winner's row survives and is reported
/// by RETURNING; losers pick the surviving row up in a corrective re-read.
async fn resolve_missing(
    conn: &mut PgConnection,
    missing: &[String],
    select_sql: &str,
    insert_sql: &str,
) -> Result<HashMap<String, i32>, sqlx::Error> {
    let mut resolved =
        rows_to_map(sqlx::query_as::<_, DimensionRow>(select_sql).bind(missing).fetch_all(&mut *conn).await?);

    let unseen: Vec<String> = missing.iter().filter(|key| !resolved.contains_key(*key)).cloned().collect();

    if !unseen.is_empty() {
        let inserted =
            rows_to_map(sqlx::query_as::<_, DimensionRow>(insert_sql).bind(&unseen).fetch_all(&mut *conn).await?);
        resolved.extend(inserted);

        // Keys the insert did not return lost a create-or-get race.
        let lost: Vec<String> = unseen.iter().filter(|key| !resolved.contains_key(*key)).cloned().collect();

        if !lost.is_empty() {
            resolved.extend(rows_to_map(
                sqlx::query_as::<_, DimensionRow>(select_sql).bind(&lost).fetch_all(&mut *conn).await?,
            ));
        }
    }

    Ok(resolved)
}

fn rows_to_map(rows: Vec<DimensionRow>) -> HashMap<String, i32> {
    rows.into_iter().map(|row| (row.natural_key, row.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn distinct_keys_drops_blanks_and_duplicates() {
        let input = keys(&["3c6444", "", "ab1234", "3c6444", "  ", "ab1234"]);

        assert_eq!(distinct_keys(&input), keys(&["3c6444", "ab1234"]));
    }

    #[test]
    fn partition_splits_hits_and_misses() {
        let cache = DimensionCache::new();
        cache.store_aircraft(&HashMap::from([("3c6444".to_string(), 7)]));

        let (hits, misses) = cache.partition_aircraft(&keys(&["3c6444", "ab1234"]));

        assert_eq!(hits, HashMap::from([("3c6444".to_string(), 7)]));
        assert_eq!(misses, keys(&["ab1234"]));
    }

    #[test]
    fn stored_entries_become_hits() {
        let cache = DimensionCache::new();
        let entries = HashMap::from([("France".to_string(), 1), ("Germany".to_string(), 2)]);
        cache.store_countries(&entries);

        let (hits, misses) = cache.partition_countries(&keys(&["France", "Germany"]));

        assert_eq!(hits, entries);
        assert!(misses.is_empty());
    }

    #[test]
    fn first_surrogate_assignment_wins() {
        let cache = DimensionCache::new();
        cache.store_aircraft(&HashMap::from([("3c6444".to_string(), 7)]));
        cache.store_aircraft(&HashMap::from([("3c6444".to_string(), 99)]));

        let (hits, _) = cache.partition_aircraft(&keys(&["3c6444"]));

        assert_eq!(hits.get("3c6444"), Some(&7));
    }

    #[test]
    fn aircraft_and_country_maps_are_independent() {
        let cache = DimensionCache::new();
        cache.store_aircraft(&HashMap::from([("France".to_string(), 1)]));

        let (hits, misses) = cache.partition_countries(&keys(&["France"]));

        assert!(hits.is_empty());
        assert_eq!(misses, keys(&["France"]));
    }
}
