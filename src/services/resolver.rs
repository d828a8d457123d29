use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheExt, CacheKey, CacheStore};
use crate::error::{AppError, AppResult};
use crate::models::{Category, CategoryItem, CategoryType};
use crate::services::fuzzy::partial_ratio;
use crate::services::upstream::UpstreamClient;

/// Candidates must score strictly above this to count as a match.
pub const FUZZY_THRESHOLD: f64 = 80.0;

/// Turns user-supplied codes, queries and identities into catalog items.
///
/// Listings are read from the cache and refreshed from upstream when the
/// cached copy is missing or does not contain what was asked for.
#[derive(Clone)]
pub struct CategoryResolver {
    cache: Arc<dyn CacheStore>,
    upstream: Arc<dyn UpstreamClient>,
    category_ttl: Duration,
}

impl CategoryResolver {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        upstream: Arc<dyn UpstreamClient>,
        category_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            upstream,
            category_ttl,
        }
    }

    pub async fn cached_category(&self, category_type: CategoryType) -> Option<Category> {
        self.cache
            .get_json(&CacheKey::category(category_type))
            .await
    }

    /// Fetch the full, unfiltered listing and replace the cached copy.
    pub async fn fetch_category(&self, category_type: CategoryType) -> AppResult<Category> {
        let listing = self.upstream.fetch_category(category_type, None).await?;
        let category = Category {
            items: listing.results,
            count: listing.count,
        };

        self.cache
            .set_json(
                &CacheKey::category(category_type),
                &category,
                Some(self.category_ttl),
            )
            .await;
        tracing::info!(
            "Cached {} listing ({} items)",
            category_type,
            category.items.len()
        );

        Ok(category)
    }

    /// The listing for `category_type`, from cache when possible.
    pub async fn category(&self, category_type: CategoryType) -> AppResult<Category> {
        match self.cached_category(category_type).await {
            Some(category) => Ok(category),
            None => self.fetch_category(category_type).await,
        }
    }

    /// Resolve one code, identity or free-text query to the best matching item.
    ///
    /// An exact identity always wins and is never fuzzy matched. Fails with
    /// `InvalidCode` when neither the cached nor a freshly fetched listing has
    /// a match.
    pub async fn resolve(&self, category_type: CategoryType, input: &str) -> AppResult<CategoryItem> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AppError::invalid_code(input));
        }

        if let Some(category) = self.cached_category(category_type).await {
            if let Some(item) = Self::lookup(&category, input) {
                return Ok(item);
            }
        }

        tracing::info!(
            "No cached {} match for '{}', refreshing listing",
            category_type,
            input
        );
        let category = self.fetch_category(category_type).await?;

        Self::lookup(&category, input).ok_or_else(|| AppError::invalid_code(input))
    }

    /// Up to `count` items matching `query`, best first. An empty query
    /// lists the first `count` items.
    pub async fn search(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
        count: usize,
    ) -> AppResult<Vec<CategoryItem>> {
        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            let category = self.category(category_type).await?;
            return Ok(category.items.into_iter().take(count).collect());
        };

        if let Some(category) = self.cached_category(category_type).await {
            let matches = fuzzy_match(&category.items, query, count);
            if !matches.is_empty() {
                return Ok(matches);
            }
        }

        let category = self.fetch_category(category_type).await?;
        Ok(fuzzy_match(&category.items, query, count))
    }

    /// Identity-only lookup: no fuzzy matching.
    pub async fn get_item(
        &self,
        category_type: CategoryType,
        identity: &str,
    ) -> AppResult<Option<CategoryItem>> {
        if let Some(category) = self.cached_category(category_type).await {
            if let Some(item) = category.find_identity(identity) {
                return Ok(Some(item.clone()));
            }
        }

        let category = self.fetch_category(category_type).await?;
        Ok(category.find_identity(identity).cloned())
    }

    /// Resolve codes of several kinds; the first unresolvable code aborts.
    pub async fn resolve_all(
        &self,
        codes: &BTreeMap<CategoryType, Vec<String>>,
    ) -> AppResult<BTreeMap<CategoryType, Vec<CategoryItem>>> {
        let mut resolved = BTreeMap::new();

        for (&category_type, inputs) in codes {
            let mut items = Vec::with_capacity(inputs.len());
            for input in inputs {
                items.push(self.resolve(category_type, input).await?);
            }
            resolved.insert(category_type, items);
        }

        Ok(resolved)
    }

    fn lookup(category: &Category, input: &str) -> Option<CategoryItem> {
        if let Some(item) = category.find_identity(input) {
            return Some(item.clone());
        }

        fuzzy_match(&category.items, input, 1).into_iter().next()
    }
}

/// Score every item against `query` by name and code, keep those above
/// [`FUZZY_THRESHOLD`] and return the best `count`, highest score first.
/// Ties keep listing order.
pub fn fuzzy_match(items: &[CategoryItem], query: &str, count: usize) -> Vec<CategoryItem> {
    let mut scored: Vec<(f64, &CategoryItem)> = items
        .iter()
        .filter_map(|item| {
            let score = partial_ratio(query, &item.name).max(partial_ratio(query, &item.code));
            (score > FUZZY_THRESHOLD).then_some((score, item))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    scored
        .into_iter()
        .take(count)
        .map(|(_, item)| item.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::services::mock::{item, MockUpstream};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn modules() -> Vec<CategoryItem> {
        vec![
            item(CategoryType::Module, "id-ca116", "CA116[1] Computing Fundamentals"),
            item(CategoryType::Module, "id-ca117", "CA117[2] Computer Programming II"),
            item(CategoryType::Module, "id-csc1003", "CSC1003[1] Computer Programming I"),
        ]
    }

    fn resolver(upstream: Arc<MockUpstream>) -> (CategoryResolver, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        (
            CategoryResolver::new(cache.clone(), upstream, DAY),
            cache,
        )
    }

    #[tokio::test]
    async fn identity_hit_short_circuits() {
        let upstream = Arc::new(MockUpstream::new());
        let (resolver, cache) = resolver(upstream.clone());
        // The identity also looks like another item's code; identity must win.
        let mut items = modules();
        items.push(item(CategoryType::Module, "CA117", "ZZ100[1] Unrelated"));
        cache
            .set_json(
                "module",
                &Category {
                    items,
                    count: 4,
                },
                None,
            )
            .await;

        let found = resolver.resolve(CategoryType::Module, "CA117").await.unwrap();
        assert_eq!(found.name, "ZZ100[1] Unrelated");
        assert_eq!(upstream.category_page_calls(), 0);
    }

    #[tokio::test]
    async fn miss_refreshes_and_caches_listing() {
        let upstream = Arc::new(MockUpstream::new().with_category(CategoryType::Module, modules()));
        let (resolver, _) = resolver(upstream.clone());

        let found = resolver.resolve(CategoryType::Module, "csc1003").await.unwrap();
        assert_eq!(found.identity, "id-csc1003");
        assert_eq!(upstream.category_page_calls(), 1);

        let found = resolver.resolve(CategoryType::Module, "CA116").await.unwrap();
        assert_eq!(found.identity, "id-ca116");
        assert_eq!(upstream.category_page_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let upstream = Arc::new(MockUpstream::new().with_category(CategoryType::Module, modules()));
        let (resolver, _) = resolver(upstream);

        let err = resolver
            .resolve(CategoryType::Module, "ZZZ9999")
            .await
            .unwrap_err();
        match err {
            AppError::InvalidCode { code } => assert_eq!(code, "ZZZ9999"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stale_cache_falls_back_to_upstream() {
        let upstream = Arc::new(MockUpstream::new().with_category(CategoryType::Module, modules()));
        let (resolver, cache) = resolver(upstream.clone());
        cache
            .set_json("module", &Category::default(), None)
            .await;

        let found = resolver.resolve(CategoryType::Module, "id-ca117").await.unwrap();
        assert_eq!(found.code, "CA117[2]");
        assert_eq!(upstream.category_page_calls(), 1);
    }

    #[test]
    fn fuzzy_match_respects_threshold() {
        let items = modules();

        // "CA117" against "CA116..." scores exactly 80, which is not enough.
        let matches = fuzzy_match(&items, "CA116", 10);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].identity, "id-ca116");

        assert!(fuzzy_match(&items, "ZZZ9999", 10).is_empty());
    }

    #[test]
    fn fuzzy_match_orders_by_score() {
        let items = modules();

        // Exact substring of CA117, one edit away from CSC1003.
        let matches = fuzzy_match(&items, "Computer Programming II", 10);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].identity, "id-ca117");
        assert_eq!(matches[1].identity, "id-csc1003");

        let top = fuzzy_match(&items, "Computer Programming II", 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].identity, "id-ca117");
    }

    #[tokio::test]
    async fn search_lists_or_filters() {
        let upstream = Arc::new(MockUpstream::new().with_category(CategoryType::Module, modules()));
        let (resolver, _) = resolver(upstream.clone());

        let first_two = resolver.search(CategoryType::Module, None, 2).await.unwrap();
        assert_eq!(first_two.len(), 2);

        let found = resolver
            .search(CategoryType::Module, Some("ca11"), 5)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(upstream.category_page_calls(), 1);
    }

    #[tokio::test]
    async fn get_item_matches_identity_only() {
        let upstream = Arc::new(MockUpstream::new().with_category(CategoryType::Module, modules()));
        let (resolver, _) = resolver(upstream);

        let found = resolver.get_item(CategoryType::Module, "id-ca116").await.unwrap();
        assert_eq!(found.map(|i| i.code), Some("CA116[1]".to_string()));

        let missing = resolver.get_item(CategoryType::Module, "CA116").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn resolve_all_aborts_on_first_invalid_code() {
        let upstream = Arc::new(
            MockUpstream::new()
                .with_category(CategoryType::Module, modules())
                .with_category(
                    CategoryType::Course,
                    vec![item(CategoryType::Course, "id-comsci1", "COMSCI1")],
                ),
        );
        let (resolver, _) = resolver(upstream);

        let mut codes = BTreeMap::new();
        codes.insert(CategoryType::Course, vec!["COMSCI1".to_string()]);
        codes.insert(CategoryType::Module, vec!["CA116".to_string()]);
        let resolved = resolver.resolve_all(&codes).await.unwrap();
        assert_eq!(resolved[&CategoryType::Course][0].identity, "id-comsci1");
        assert_eq!(resolved[&CategoryType::Module][0].identity, "id-ca116");

        codes.insert(CategoryType::Module, vec!["ZZZ9999".to_string()]);
        let err = resolver.resolve_all(&codes).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCode { .. }));
    }

    #[tokio::test]
    async fn empty_listing_yields_invalid_code() {
        let upstream = Arc::new(MockUpstream::new());
        let (resolver, _) = resolver(upstream);

        let err = resolver.resolve(CategoryType::Club, "anything").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCode { .. }));
    }
}
