//! Result cache keys.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::application::catalog::SearchParams;
use crate::domain::signature::QuerySignature;

/// Signature plus a hash of the page parameters outside the signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub signature: QuerySignature,
    pub variant: u64,
}

impl ResultKey {
    pub fn new(signature: QuerySignature, params: &SearchParams) -> Self {
        Self {
            signature,
            variant: hash_page_params(params),
        }
    }
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn hash_page_params(params: &SearchParams) -> u64 {
    hash_value(&(
        &params.search,
        &params.category,
        &params.location,
        params.date_to,
        params.lat.map(f64::to_bits),
        params.lng.map(f64::to_bits),
        params.radius_km.map(f64::to_bits),
        params.limit,
        params.offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signature::ScrapeQuery;

    fn params() -> SearchParams {
        SearchParams {
            search: Some("jazz".to_string()),
            category: None,
            date_from: None,
            date_to: None,
            location: None,
            lat: None,
            lng: None,
            radius_km: None,
            limit: 50,
            offset: 0,
        }
    }

    #[test]
    fn page_parameters_split_keys_of_one_signature() {
        let signature = ScrapeQuery::default().signature();
        let first = ResultKey::new(signature.clone(), &params());
        let mut next = params();
        next.offset = 50;
        let second = ResultKey::new(signature, &next);

        assert_eq!(first.signature, second.signature);
        assert_ne!(first, second);
    }

    #[test]
    fn hash_value_is_stable_within_process() {
        assert_eq!(hash_value(&"milano"), hash_value(&"milano"));
    }
}
