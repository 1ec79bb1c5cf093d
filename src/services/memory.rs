use async_trait::async_trait;
use std::sync::RwLock;

use crate::core::distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box};
use crate::core::filters::matches_filters;
use crate::core::geo_index::{GeoIndex, GeoIndexError};
use crate::models::{Asset, AssetKey, AssetRole, ComparableMatch, ComparableQuery};

/// Process-local spatial index over a slice of assets.
///
/// Two-stage search: a bounding-box pre-filter, then exact haversine distance.
/// Ties in distance keep insertion order.
#[derive(Debug, Default)]
pub struct InMemoryGeoIndex {
    assets: RwLock<Vec<Asset>>,
}

impl InMemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let index = Self::new();
        for asset in assets {
            index.insert(asset);
        }
        index
    }

    /// Insert or replace the asset with the same role and dedup key
    pub fn insert(&self, asset: Asset) {
        let mut assets = match self.assets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = asset.key();
        match assets.iter_mut().find(|a| a.role == asset.role && a.key() == key) {
            Some(existing) => *existing = asset,
            None => assets.push(asset),
        }
    }

    /// Remove the asset with this role and dedup key
    pub fn remove(&self, role: AssetRole, key: &AssetKey) -> bool {
        let mut assets = match self.assets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = assets.len();
        assets.retain(|a| !(a.role == role && &a.key() == key));
        assets.len() != before
    }

    pub fn len(&self) -> usize {
        self.assets.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GeoIndex for InMemoryGeoIndex {
    async fn query(&self, query: &ComparableQuery) -> Result<Vec<ComparableMatch>, GeoIndexError> {
        if !query.center.is_valid() {
            return Err(GeoIndexError::InvalidQuery(format!(
                "center out of range: {}, {}",
                query.center.lat, query.center.lon
            )));
        }
        if !(query.radius_m.is_finite() && query.radius_m >= 0.0) {
            return Err(GeoIndexError::InvalidQuery(format!(
                "radius must be non-negative, got {}",
                query.radius_m
            )));
        }

        let assets = self
            .assets
            .read()
            .map_err(|_| GeoIndexError::Database("index lock poisoned".to_string()))?;

        let bbox = calculate_bounding_box(&query.center, query.radius_m);

        let mut matches: Vec<ComparableMatch> = assets
            .iter()
            // Stage 1: cheap bounding box pre-filter
            .filter(|asset| is_within_bounding_box(&asset.location, &bbox))
            // Stage 2: size and attributes
            .filter(|asset| query.sqm_range.contains(asset.sqm))
            .filter(|asset| matches_filters(asset, &query.filters))
            // Stage 3: exact distance
            .filter_map(|asset| {
                let distance_m = haversine_distance(&query.center, &asset.location);
                (distance_m <= query.radius_m).then(|| ComparableMatch {
                    asset: asset.clone(),
                    distance_m,
                })
            })
            .collect();

        // Stable sort keeps insertion order on ties
        matches.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        matches.truncate(query.limit);

        Ok(matches)
    }
}
