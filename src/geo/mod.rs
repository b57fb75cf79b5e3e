//! Geo index (§4.5): geohash-bucketed proximity search.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbErrorKind, Result};
use crate::manifest::LocationRecord;

const GEOHASH_ALPHABET: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
pub const DEFAULT_PRECISION: usize = 6;

/// Encodes `(lat, lng)` into a geohash string of the given character
/// precision, alternating longitude/latitude bit-interleaving (longitude
/// bit first), 5 bits packed per base-32 character.
pub fn encode(lat: f64, lng: f64, precision: usize) -> String {
    let mut lat_range = (-90.0, 90.0);
    let mut lng_range = (-180.0, 180.0);
    let mut out = String::with_capacity(precision);
    let mut bit = 0;
    let mut ch = 0u8;
    let mut even = true;

    while out.len() < precision {
        if even {
            let mid = (lng_range.0 + lng_range.1) / 2.0;
            if lng >= mid {
                ch |= 1 << (4 - bit);
                lng_range.0 = mid;
            } else {
                lng_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                ch |= 1 << (4 - bit);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }
        even = !even;
        if bit < 4 {
            bit += 1;
        } else {
            out.push(GEOHASH_ALPHABET[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }
    out
}

/// Decoded cell center plus the half-width error bound on each axis.
pub struct DecodedCell {
    pub lat: f64,
    pub lng: f64,
    pub lat_error: f64,
    pub lng_error: f64,
}

pub fn decode(geohash: &str) -> Result<DecodedCell> {
    let mut lat_range = (-90.0, 90.0);
    let mut lng_range = (-180.0, 180.0);
    let mut even = true;

    for c in geohash.chars() {
        let idx = GEOHASH_ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or_else(|| KbError::new(KbErrorKind::InvalidArgument, format!("invalid geohash character '{c}'")))?;
        for bit in (0..5).rev() {
            let b = (idx >> bit) & 1;
            if even {
                let mid = (lng_range.0 + lng_range.1) / 2.0;
                if b == 1 {
                    lng_range.0 = mid;
                } else {
                    lng_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if b == 1 {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            even = !even;
        }
    }

    Ok(DecodedCell {
        lat: (lat_range.0 + lat_range.1) / 2.0,
        lng: (lng_range.0 + lng_range.1) / 2.0,
        lat_error: (lat_range.1 - lat_range.0) / 2.0,
        lng_error: (lng_range.1 - lng_range.0) / 2.0,
    })
}

/// Great-circle distance in meters between two (lat, lng) points.
pub fn haversine(a_lat: f64, a_lng: f64, b_lat: f64, b_lng: f64) -> f64 {
    let (lat1, lat2) = (a_lat.to_radians(), b_lat.to_radians());
    let dlat = (b_lat - a_lat).to_radians();
    let dlng = (b_lng - a_lng).to_radians();
    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoEntry {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    pub category: String,
    pub location: LocationRecord,
    pub geohash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializedGeoIndex {
    version: u32,
    entries: Vec<GeoEntry>,
    buckets: HashMap<String, Vec<String>>,
}

/// Mapping `id -> GeoEntry`, plus the inverted `geohash prefix -> id set`
/// index over spatial cells.
pub struct GeoIndex {
    entries: HashMap<String, GeoEntry>,
    buckets: HashMap<String, HashSet<String>>,
    precision: usize,
}

impl GeoIndex {
    pub fn new(precision: usize) -> Self {
        Self {
            entries: HashMap::new(),
            buckets: HashMap::new(),
            precision,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let parsed: SerializedGeoIndex = serde_json::from_slice(bytes)
            .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "malformed geo-index json", e))?;
        let precision = parsed
            .entries
            .first()
            .map(|e| e.geohash.len())
            .unwrap_or(DEFAULT_PRECISION);
        let mut index = GeoIndex::new(precision);
        for entry in parsed.entries {
            index.entries.insert(entry.id.clone(), entry);
        }
        for (prefix, ids) in parsed.buckets {
            index.buckets.insert(prefix, ids.into_iter().collect());
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, entry: GeoEntry) {
        let geohash = encode(entry.lat, entry.lng, self.precision);
        let id = entry.id.clone();
        let mut entry = entry;
        entry.geohash = geohash.clone();
        self.entries.insert(id.clone(), entry);
        self.buckets.entry(geohash).or_default().insert(id);
    }

    /// Removes an entry, pruning its bucket if it becomes empty.
    pub fn remove(&mut self, id: &str) {
        if let Some(entry) = self.entries.remove(id) {
            if let Some(bucket) = self.buckets.get_mut(&entry.geohash) {
                bucket.remove(id);
                if bucket.is_empty() {
                    self.buckets.remove(&entry.geohash);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&GeoEntry> {
        self.entries.get(id)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Population of each occupied geohash bucket, for `geo_index_stats`.
    pub fn bucket_populations(&self) -> Vec<usize> {
        self.buckets.values().map(|b| b.len()).collect()
    }

    /// Candidate geohash cells whose bounding box intersects the R-disk
    /// around `(lat, lng)`, found by BFS from the center cell outward.
    fn candidate_cells(&self, lat: f64, lng: f64, radius_m: f64) -> HashSet<String> {
        let center = encode(lat, lng, self.precision);
        let mut visited = HashSet::new();
        let mut frontier = vec![center];
        visited.insert(frontier[0].clone());

        loop {
            let mut next = Vec::new();
            for cell in &frontier {
                for neighbor in neighbors(cell) {
                    if visited.contains(&neighbor) {
                        continue;
                    }
                    if cell_intersects_disk(&neighbor, lat, lng, radius_m) {
                        visited.insert(neighbor.clone());
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited
    }

    /// Radius search: candidate cells → union entries → category filter →
    /// bounding-box + Haversine refinement → ascending-distance sort,
    /// truncated to `limit` (ties broken by ascending id, per §5).
    pub fn radius_search(
        &self,
        lat: f64,
        lng: f64,
        radius_m: f64,
        limit: usize,
        category: Option<&str>,
    ) -> Vec<(GeoEntry, f64)> {
        let cells = self.candidate_cells(lat, lng, radius_m);
        let mut candidate_ids = HashSet::new();
        for cell in &cells {
            if let Some(bucket) = self.buckets.get(cell) {
                candidate_ids.extend(bucket.iter().cloned());
            }
        }

        let mut results: Vec<(GeoEntry, f64)> = candidate_ids
            .into_iter()
            .filter_map(|id| self.entries.get(&id).cloned())
            .filter(|entry| category.map(|c| entry.category == c).unwrap_or(true))
            .map(|entry| {
                let d = haversine(lat, lng, entry.lat, entry.lng);
                (entry, d)
            })
            .filter(|(_, d)| *d <= radius_m)
            .collect();

        results.sort_by(|(a, da), (b, db)| {
            da.partial_cmp(db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);
        results
    }
}

fn neighbors(cell: &str) -> Vec<String> {
    let decoded = match decode(cell) {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };
    let precision = cell.len();
    let lat_step = decoded.lat_error * 2.0;
    let lng_step = decoded.lng_error * 2.0;

    let mut out = Vec::with_capacity(8);
    for dlat in [-1i8, 0, 1] {
        for dlng in [-1i8, 0, 1] {
            if dlat == 0 && dlng == 0 {
                continue;
            }
            let lat = (decoded.lat + dlat as f64 * lat_step).clamp(-90.0, 90.0);
            let mut lng = decoded.lng + dlng as f64 * lng_step;
            if lng > 180.0 {
                lng -= 360.0;
            } else if lng < -180.0 {
                lng += 360.0;
            }
            out.push(encode(lat, lng, precision));
        }
    }
    out
}

/// Closest-point-to-rectangle test: does the cell's bounding box come
/// within `radius_m` of `(lat, lng)`, using an equirectangular
/// approximation scaled by `cos(lat)` for longitude?
fn cell_intersects_disk(cell: &str, lat: f64, lng: f64, radius_m: f64) -> bool {
    let decoded = match decode(cell) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let min_lat = decoded.lat - decoded.lat_error;
    let max_lat = decoded.lat + decoded.lat_error;
    let min_lng = decoded.lng - decoded.lng_error;
    let max_lng = decoded.lng + decoded.lng_error;

    let closest_lat = lat.clamp(min_lat, max_lat);
    let closest_lng = lng.clamp(min_lng, max_lng);
    haversine(lat, lng, closest_lat, closest_lng) <= radius_m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geohash_san_francisco_matches_known_value() {
        assert_eq!(encode(37.7749, -122.4194, 6), "9q8yyk");
    }

    #[test]
    fn geohash_decode_is_within_error_bound() {
        let decoded = decode("9q8yyk").unwrap();
        assert!((decoded.lat - 37.7749).abs() <= decoded.lat_error);
        assert!((decoded.lng - (-122.4194)).abs() <= decoded.lng_error);
    }

    #[test]
    fn invalid_geohash_character_is_rejected() {
        let err = decode("9q8!!k").unwrap_err();
        assert_eq!(err.kind(), KbErrorKind::InvalidArgument);
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine(37.7749, -122.4194, 34.0522, -118.2437);
        let b = haversine(34.0522, -118.2437, 37.7749, -122.4194);
        assert!((a - b).abs() < 1e-6 * a);
    }

    #[test]
    fn haversine_sf_to_la_is_in_expected_range() {
        let d = haversine(37.7749, -122.4194, 34.0522, -118.2437);
        assert!(d > 550_000.0 && d < 570_000.0, "got {d}");
    }

    fn loc() -> LocationRecord {
        LocationRecord {
            file_path: "articles/place/place.0.parquet".to_string(),
            row_group: 0,
            row: 0,
        }
    }

    fn entry(id: &str, lat: f64, lng: f64, category: &str) -> GeoEntry {
        GeoEntry {
            id: id.to_string(),
            lat,
            lng,
            title: id.to_string(),
            category: category.to_string(),
            location: loc(),
            geohash: String::new(),
        }
    }

    #[test]
    fn radius_search_with_category_filter_orders_by_distance() {
        let mut index = GeoIndex::new(6);
        index.insert(entry("sf", 37.7749, -122.4194, "place"));
        index.insert(entry("oakland", 37.8044, -122.2712, "place"));
        index.insert(entry("san_jose", 37.3382, -121.8863, "place"));
        index.insert(entry("la", 34.0522, -118.2437, "place"));
        index.insert(entry("golden_gate_bridge", 37.8199, -122.4783, "work"));

        let results = index.radius_search(37.78, -122.42, 50_000.0, 10, Some("place"));
        let ids: Vec<&str> = results.iter().map(|(e, _)| e.id.as_str()).collect();
        assert_eq!(ids, vec!["sf", "oakland", "san_jose"]);
        assert!(!ids.contains(&"la"));
    }

    #[test]
    fn radius_search_soundness_every_result_within_max_distance() {
        let mut index = GeoIndex::new(6);
        for i in 0..20 {
            index.insert(entry(
                &format!("p{i}"),
                37.7 + i as f64 * 0.01,
                -122.4 + i as f64 * 0.01,
                "place",
            ));
        }
        let radius = 5_000.0;
        let results = index.radius_search(37.7749, -122.4194, radius, 100, None);
        for (_, d) in &results {
            assert!(*d <= radius);
        }
    }

    #[test]
    fn remove_prunes_empty_bucket() {
        let mut index = GeoIndex::new(6);
        index.insert(entry("a", 10.0, 10.0, "place"));
        let geohash = index.get("a").unwrap().geohash.clone();
        assert!(index.buckets.contains_key(&geohash));
        index.remove("a");
        assert!(!index.buckets.contains_key(&geohash));
    }
}
