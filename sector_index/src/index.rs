/// StorageIndex tracks which storage backends hold which sector files and picks
/// backends for new allocations.
///
/// Two maps live behind one RwLock:
/// - sectors: (sector, file kind) -> backends believed to hold that file
/// - stores:  backend id -> descriptor + last reported health
///
/// Lookups take the lock shared, mutations take it exclusive. Nothing awaits
/// while the lock is held, so contention stays short.
use crate::{
    Decl, FsStat, HealthReport, RegisteredProof, SealOverheadEstimator, SectorDecl, SectorFileType,
    SectorFileTypes, SectorId, SectorIndexConfig, SectorIndexError, SectorIndexResult,
    SpaceEstimator, StorageHealth, StorageId, StorageInfo,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

/// Operations the scheduler and workers use to locate and place sector data.
#[async_trait]
pub trait SectorIndex: Send + Sync {
    async fn storage_attach(&self, info: StorageInfo, stat: FsStat) -> SectorIndexResult<()>;
    async fn storage_info(&self, id: &StorageId) -> SectorIndexResult<StorageInfo>;
    async fn storage_report_health(
        &self,
        id: &StorageId,
        report: HealthReport,
    ) -> SectorIndexResult<()>;

    async fn storage_declare_sector(
        &self,
        storage_id: &StorageId,
        sector: SectorId,
        file_types: SectorFileTypes,
    ) -> SectorIndexResult<()>;
    async fn storage_drop_sector(
        &self,
        storage_id: &StorageId,
        sector: SectorId,
        file_types: SectorFileTypes,
    ) -> SectorIndexResult<()>;
    async fn storage_find_sector(
        &self,
        sector: SectorId,
        file_types: SectorFileTypes,
        allow_fetch: bool,
    ) -> SectorIndexResult<Vec<StorageInfo>>;

    async fn storage_best_alloc(
        &self,
        allocate: SectorFileTypes,
        proof: RegisteredProof,
        sealing: bool,
    ) -> SectorIndexResult<Vec<StorageInfo>>;
}

#[derive(Debug, Clone)]
struct StorageEntry {
    info: StorageInfo,
    fsi: FsStat,

    last_heartbeat: Instant,
    heartbeat_err: Option<String>,
}

#[derive(Debug, Default)]
struct IndexState {
    sectors: HashMap<Decl, Vec<StorageId>>,
    stores: HashMap<StorageId, StorageEntry>,
}

#[derive(Clone)]
pub struct StorageIndex {
    state: Arc<RwLock<IndexState>>,
    estimator: Arc<dyn SpaceEstimator>,
    config: SectorIndexConfig,
}

impl Default for StorageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageIndex {
    /// Create an index with default heartbeat tunables and the seal overhead estimator
    pub fn new() -> Self {
        Self::with_config(SectorIndexConfig::default(), Arc::new(SealOverheadEstimator))
    }

    pub fn with_config(config: SectorIndexConfig, estimator: Arc<dyn SpaceEstimator>) -> Self {
        Self {
            state: Arc::new(RwLock::new(IndexState::default())),
            estimator,
            config,
        }
    }

    pub fn config(&self) -> &SectorIndexConfig {
        &self.config
    }

    /// Register a backend, or merge the urls of one already known.
    ///
    /// A repeat attach only appends urls not seen before; weight, capability
    /// flags and health stay as they were. All urls are checked before any
    /// change is made.
    pub async fn storage_attach(&self, info: StorageInfo, stat: FsStat) -> SectorIndexResult<()> {
        for u in info.urls.iter() {
            check_location(u)?;
        }

        let mut state = self.state.write().await;

        if let Some(entry) = state.stores.get_mut(&info.id) {
            let mut added = 0;
            for u in info.urls.into_iter() {
                if entry.info.urls.contains(&u) {
                    continue;
                }
                entry.info.urls.push(u);
                added += 1;
            }
            info!(
                "sector storage {} re-attached, {} new url(s), {} total",
                entry.info.id,
                added,
                entry.info.urls.len()
            );
            return Ok(());
        }

        info!("new sector storage: {}", info.id);
        let id = info.id.clone();
        state.stores.insert(
            id,
            StorageEntry {
                info,
                fsi: stat,
                last_heartbeat: Instant::now(),
                heartbeat_err: None,
            },
        );
        Ok(())
    }

    pub async fn storage_info(&self, id: &StorageId) -> SectorIndexResult<StorageInfo> {
        let state = self.state.read().await;
        state
            .stores
            .get(id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| SectorIndexError::UnknownBackend(id.to_string()))
    }

    pub async fn storage_health(&self, id: &StorageId) -> SectorIndexResult<StorageHealth> {
        let state = self.state.read().await;
        let entry = state
            .stores
            .get(id)
            .ok_or_else(|| SectorIndexError::UnknownBackend(id.to_string()))?;
        Ok(StorageHealth {
            stat: entry.fsi,
            err: entry.heartbeat_err.clone(),
            since_heartbeat: entry.last_heartbeat.elapsed(),
        })
    }

    /// Record a heartbeat. This is the only place last_heartbeat moves after attach.
    pub async fn storage_report_health(
        &self,
        id: &StorageId,
        report: HealthReport,
    ) -> SectorIndexResult<()> {
        let mut state = self.state.write().await;

        let entry = state.stores.get_mut(id).ok_or_else(|| {
            warn!("health report for unknown storage: {}", id);
            SectorIndexError::UnknownBackend(id.to_string())
        })?;

        if let Some(err) = report.err.as_ref() {
            warn!("storage {} reported heartbeat error: {}", id, err);
        }

        entry.fsi = report.stat;
        entry.heartbeat_err = report.err;
        entry.last_heartbeat = Instant::now();
        Ok(())
    }

    /// Declare that `storage_id` holds the given kinds of `sector`.
    ///
    /// The backend does not have to be attached. Re-declaring a kind is a no-op.
    pub async fn storage_declare_sector(
        &self,
        storage_id: &StorageId,
        sector: SectorId,
        file_types: SectorFileTypes,
    ) -> SectorIndexResult<()> {
        let mut state = self.state.write().await;

        for file_type in file_types.iter() {
            let holders = state
                .sectors
                .entry(Decl::new(sector, file_type))
                .or_default();

            if holders.contains(storage_id) {
                warn!(
                    "sector {} ({}) redeclared in {}",
                    sector, file_type, storage_id
                );
                continue;
            }

            holders.push(storage_id.clone());
        }

        Ok(())
    }

    /// Remove `storage_id` from the holders of the given kinds of `sector`.
    ///
    /// A decl left with no holders is deleted from the map.
    pub async fn storage_drop_sector(
        &self,
        storage_id: &StorageId,
        sector: SectorId,
        file_types: SectorFileTypes,
    ) -> SectorIndexResult<()> {
        let mut state = self.state.write().await;

        for file_type in file_types.iter() {
            let decl = Decl::new(sector, file_type);

            let holders = match state.sectors.get_mut(&decl) {
                Some(h) => h,
                None => {
                    debug!(
                        "drop of undeclared sector {} ({}) in {}",
                        sector, file_type, storage_id
                    );
                    continue;
                }
            };

            holders.retain(|sid| sid != storage_id);
            if holders.is_empty() {
                state.sectors.remove(&decl);
            }
        }

        Ok(())
    }

    /// Find where the requested kinds of a sector can be accessed.
    ///
    /// Algorithm:
    /// 1. Count, per backend, how many of the requested kinds it holds
    /// 2. Each holder gets weight = descriptor weight * that count
    /// 3. With allow_fetch, every other known backend is added with weight 0
    ///
    /// Result order is not a ranking; sort by weight to pick.
    pub async fn storage_find_sector(
        &self,
        sector: SectorId,
        file_types: SectorFileTypes,
        allow_fetch: bool,
    ) -> SectorIndexResult<Vec<StorageInfo>> {
        let state = self.state.read().await;

        let mut holders: BTreeMap<&StorageId, u64> = BTreeMap::new();
        for file_type in file_types.iter() {
            if let Some(ids) = state.sectors.get(&Decl::new(sector, file_type)) {
                for id in ids.iter() {
                    *holders.entry(id).or_insert(0) += 1;
                }
            }
        }

        let mut out = Vec::with_capacity(holders.len());
        for (id, count) in holders.iter() {
            let entry = match state.stores.get(*id) {
                Some(e) => e,
                None => {
                    warn!(
                        "storage {} is not present in sector index (referenced by sector {})",
                        id, sector
                    );
                    continue;
                }
            };

            // storage holding more of the requested kinds is preferred
            let weight = entry.info.weight.saturating_mul(*count);
            out.push(located_info(&entry.info, sector, file_types, weight)?);
        }

        if allow_fetch {
            let mut others: Vec<&StorageEntry> = state
                .stores
                .values()
                .filter(|e| !holders.contains_key(&e.info.id))
                .collect();
            others.sort_by(|a, b| a.info.id.cmp(&b.info.id));

            for entry in others {
                // TODO: rank fetch sources by something better than a flat 0
                out.push(located_info(&entry.info, sector, file_types, 0)?);
            }
        }

        Ok(out)
    }

    /// Rank backends able to take new data of the requested kinds.
    ///
    /// A backend is a candidate when it has the right capability (seal or
    /// store), enough available space, a heartbeat within the skipped
    /// heartbeat threshold and no reported error. Candidates are ordered by
    /// available * weight, largest first.
    pub async fn storage_best_alloc(
        &self,
        allocate: SectorFileTypes,
        proof: RegisteredProof,
        sealing: bool,
    ) -> SectorIndexResult<Vec<StorageInfo>> {
        let space_req = self
            .estimator
            .space_required(allocate, proof)
            .map_err(|e| match e {
                SectorIndexError::UnsupportedAllocation(msg) => {
                    SectorIndexError::UnsupportedAllocation(format!(
                        "estimating required space: {}",
                        msg
                    ))
                }
                other => other,
            })?;
        let stale_after = self.config.skipped_heartbeat_thresh();

        let state = self.state.read().await;

        let mut candidates: Vec<&StorageEntry> = Vec::new();
        for entry in state.stores.values() {
            if sealing && !entry.info.can_seal {
                debug!("not allocating on {}, sealing not allowed", entry.info.id);
                continue;
            }
            if !sealing && !entry.info.can_store {
                debug!("not allocating on {}, storing not allowed", entry.info.id);
                continue;
            }

            if space_req > entry.fsi.available {
                debug!(
                    "not allocating on {}, out of space (available: {}, need: {})",
                    entry.info.id, entry.fsi.available, space_req
                );
                continue;
            }

            let since = entry.last_heartbeat.elapsed();
            if since > stale_after {
                debug!(
                    "not allocating on {}, didn't receive heartbeats for {:?}",
                    entry.info.id, since
                );
                continue;
            }

            if let Some(err) = entry.heartbeat_err.as_ref() {
                debug!(
                    "not allocating on {}, heartbeat error: {}",
                    entry.info.id, err
                );
                continue;
            }

            candidates.push(entry);
        }

        if candidates.is_empty() {
            return Err(SectorIndexError::NoViablePlacement(format!(
                "no storage can take {} for {:?} (sealing: {}, need {} bytes)",
                allocate, proof, sealing, space_req
            )));
        }

        candidates.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        candidates.sort_by(|a, b| alloc_score(b).cmp(&alloc_score(a)));

        Ok(candidates.into_iter().map(|e| e.info.clone()).collect())
    }

    /// Every known backend with the sectors it holds, kinds folded per sector.
    pub async fn storage_list(&self) -> SectorIndexResult<HashMap<StorageId, Vec<SectorDecl>>> {
        let state = self.state.read().await;

        let mut by_id: HashMap<StorageId, BTreeMap<SectorId, SectorFileTypes>> = state
            .stores
            .keys()
            .map(|id| (id.clone(), BTreeMap::new()))
            .collect();

        for (decl, ids) in state.sectors.iter() {
            for id in ids.iter() {
                if !state.stores.contains_key(id) {
                    debug!("listing declarations of unattached storage {}", id);
                }
                *by_id
                    .entry(id.clone())
                    .or_default()
                    .entry(decl.sector)
                    .or_default() |= decl.file_type;
            }
        }

        Ok(by_id
            .into_iter()
            .map(|(id, sectors)| {
                let decls = sectors
                    .into_iter()
                    .map(|(sector, file_types)| SectorDecl { sector, file_types })
                    .collect();
                (id, decls)
            })
            .collect())
    }

    /// Raw holders of one (sector, kind), in declaration order.
    pub async fn find_sector(
        &self,
        sector: SectorId,
        file_type: SectorFileType,
    ) -> Vec<StorageId> {
        let state = self.state.read().await;
        state
            .sectors
            .get(&Decl::new(sector, file_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of (sector, kind) pairs with at least one holder.
    pub async fn sector_count(&self) -> usize {
        let state = self.state.read().await;
        state.sectors.len()
    }

    pub async fn storage_count(&self) -> usize {
        let state = self.state.read().await;
        state.stores.len()
    }
}

#[async_trait]
impl SectorIndex for StorageIndex {
    async fn storage_attach(&self, info: StorageInfo, stat: FsStat) -> SectorIndexResult<()> {
        StorageIndex::storage_attach(self, info, stat).await
    }

    async fn storage_info(&self, id: &StorageId) -> SectorIndexResult<StorageInfo> {
        StorageIndex::storage_info(self, id).await
    }

    async fn storage_report_health(
        &self,
        id: &StorageId,
        report: HealthReport,
    ) -> SectorIndexResult<()> {
        StorageIndex::storage_report_health(self, id, report).await
    }

    async fn storage_declare_sector(
        &self,
        storage_id: &StorageId,
        sector: SectorId,
        file_types: SectorFileTypes,
    ) -> SectorIndexResult<()> {
        StorageIndex::storage_declare_sector(self, storage_id, sector, file_types).await
    }

    async fn storage_drop_sector(
        &self,
        storage_id: &StorageId,
        sector: SectorId,
        file_types: SectorFileTypes,
    ) -> SectorIndexResult<()> {
        StorageIndex::storage_drop_sector(self, storage_id, sector, file_types).await
    }

    async fn storage_find_sector(
        &self,
        sector: SectorId,
        file_types: SectorFileTypes,
        allow_fetch: bool,
    ) -> SectorIndexResult<Vec<StorageInfo>> {
        StorageIndex::storage_find_sector(self, sector, file_types, allow_fetch).await
    }

    async fn storage_best_alloc(
        &self,
        allocate: SectorFileTypes,
        proof: RegisteredProof,
        sealing: bool,
    ) -> SectorIndexResult<Vec<StorageInfo>> {
        StorageIndex::storage_best_alloc(self, allocate, proof, sealing).await
    }
}

// u64 * u64 always fits in u128
fn alloc_score(entry: &StorageEntry) -> u128 {
    entry.fsi.available as u128 * entry.info.weight as u128
}

fn check_location(location: &str) -> SectorIndexResult<Url> {
    let url = Url::parse(location).map_err(|e| {
        warn!("failed to parse storage url {}: {}", location, e);
        SectorIndexError::MalformedLocation(format!("{}: {}", location, e))
    })?;
    if url.cannot_be_a_base() {
        warn!("storage url {} cannot carry a path", location);
        return Err(SectorIndexError::MalformedLocation(format!(
            "{}: cannot be a base url",
            location
        )));
    }
    Ok(url)
}

/// `<base>/<file kinds>/<sector name>` for one base url.
fn sector_location(
    base: &str,
    sector: SectorId,
    file_types: SectorFileTypes,
) -> SectorIndexResult<String> {
    // attach validated every stored url, so a failure here means the index is inconsistent
    let mut url = check_location(base)?;
    url.path_segments_mut()
        .map_err(|_| SectorIndexError::MalformedLocation(format!("{}: cannot be a base url", base)))?
        .pop_if_empty()
        .push(&file_types.to_string())
        .push(&sector.sector_name());
    Ok(url.to_string())
}

fn located_info(
    info: &StorageInfo,
    sector: SectorId,
    file_types: SectorFileTypes,
    weight: u64,
) -> SectorIndexResult<StorageInfo> {
    let urls = info
        .urls
        .iter()
        .map(|u| sector_location(u, sector, file_types))
        .collect::<SectorIndexResult<Vec<String>>>()?;

    Ok(StorageInfo {
        id: info.id.clone(),
        urls,
        weight,
        can_seal: info.can_seal,
        can_store: info.can_store,
    })
}
