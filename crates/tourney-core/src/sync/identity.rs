//! Identity resolution across the two stores.
//!
//! The cross-reference id is authoritative. The name fallback exists only for
//! rows that predate cross-reference tracking and is best-effort.

use chrono::NaiveDate;

use crate::models::{ApplicationId, Tournament};
use crate::services::PublicationStore;
use crate::Result;

/// How (and whether) a publication row was found for an upstream record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exact cross-reference match
    ById(Tournament),
    /// Unlinked row matched by name; `candidates` > 1 means the pick was ambiguous
    ByNameHeuristic {
        tournament: Tournament,
        candidates: usize,
    },
    Unresolved,
}

impl Resolution {
    pub fn into_tournament(self) -> Option<Tournament> {
        match self {
            Self::ById(tournament) | Self::ByNameHeuristic { tournament, .. } => Some(tournament),
            Self::Unresolved => None,
        }
    }

    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::ByNameHeuristic { candidates, .. } if *candidates > 1)
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    store: PublicationStore,
}

impl IdentityResolver {
    pub const fn new(store: PublicationStore) -> Self {
        Self { store }
    }

    /// Resolve an approved upstream record for upsert.
    ///
    /// Falls back to an unlinked row with the same name and start date,
    /// including locally owned rows so they get linked instead of duplicated.
    pub async fn resolve_for_pull(
        &self,
        application_id: &ApplicationId,
        name: &str,
        start_date: NaiveDate,
    ) -> Result<Resolution> {
        if let Some(tournament) = self.store.find_by_cross_ref(application_id).await? {
            return Ok(Resolution::ById(tournament));
        }
        let candidates = self
            .store
            .find_unlinked_by_name_and_date(name, start_date)
            .await?;
        Ok(pick_freshest(application_id, candidates))
    }

    /// Resolve an upstream record that was deleted or left the approved state.
    ///
    /// The name fallback skips locally owned rows; those were never mirrored
    /// from upstream and must not be removed on its behalf. A known start date
    /// keeps the fallback to the same edition.
    pub async fn resolve_for_removal(
        &self,
        application_id: &ApplicationId,
        name: Option<&str>,
        start_date: Option<NaiveDate>,
    ) -> Result<Resolution> {
        if let Some(tournament) = self.store.find_by_cross_ref(application_id).await? {
            return Ok(Resolution::ById(tournament));
        }
        let Some(name) = name.filter(|name| !name.trim().is_empty()) else {
            return Ok(Resolution::Unresolved);
        };
        let candidates = self.store.find_removal_candidates(name, start_date).await?;
        Ok(pick_freshest(application_id, candidates))
    }
}

fn pick_freshest(application_id: &ApplicationId, candidates: Vec<Tournament>) -> Resolution {
    let count = candidates.len();
    let Some(tournament) = candidates.into_iter().max_by_key(Tournament::recency_key) else {
        return Resolution::Unresolved;
    };

    if count > 1 {
        tracing::warn!(
            application_id = %application_id,
            tournament_id = %tournament.id,
            candidates = count,
            "Ambiguous name match; using the most recently updated tournament"
        );
    }
    Resolution::ByNameHeuristic {
        tournament,
        candidates: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ownership, TournamentFields};

    fn fields(name: &str, start: &str) -> TournamentFields {
        TournamentFields::new(name, start.parse().unwrap())
    }

    fn app(id: &str) -> ApplicationId {
        ApplicationId::parse(id).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cross_ref_wins_over_name() {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let linked = store
            .insert_linked(&fields("Renamed Upstream", "2025-01-15"), &app("A1"), None)
            .await
            .unwrap();
        store
            .create_local(&fields("KL Open", "2025-01-15"))
            .await
            .unwrap();

        let resolver = IdentityResolver::new(store);
        let resolution = resolver
            .resolve_for_pull(&app("A1"), "KL Open", "2025-01-15".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::ById(linked));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn name_and_date_fallback_finds_legacy_row() {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let legacy = store
            .create_local(&fields("KL Open", "2025-01-15"))
            .await
            .unwrap();

        let resolver = IdentityResolver::new(store);
        let resolution = resolver
            .resolve_for_pull(&app("A1"), "kl open", "2025-01-15".parse().unwrap())
            .await
            .unwrap();
        assert!(matches!(
            &resolution,
            Resolution::ByNameHeuristic { tournament, candidates: 1 } if tournament.id == legacy.id
        ));

        let other_date = resolver
            .resolve_for_pull(&app("A1"), "KL Open", "2025-02-15".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(other_date, Resolution::Unresolved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ambiguous_match_prefers_most_recent() {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let older = store
            .create_local(&fields("KL Open", "2025-01-15"))
            .await
            .unwrap();
        let newer = store
            .create_local(&fields("KL Open", "2025-01-15"))
            .await
            .unwrap();
        // Bump the second row so its updated_at is strictly later
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = store
            .update_local(&newer.id, newer.version, &newer.fields)
            .await
            .unwrap();

        let resolution = IdentityResolver::new(store)
            .resolve_for_pull(&app("A1"), "KL Open", "2025-01-15".parse().unwrap())
            .await
            .unwrap();
        assert!(resolution.is_ambiguous());
        let picked = resolution.into_tournament().unwrap();
        assert_eq!(picked.id, newer.id);
        assert_ne!(picked.id, older.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removal_fallback_ignores_local_rows() {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let local = store
            .create_local(&fields("KL Open", "2025-01-15"))
            .await
            .unwrap();
        assert_eq!(local.ownership, Some(Ownership::Local));

        let resolver = IdentityResolver::new(store);
        let resolution = resolver
            .resolve_for_removal(&app("A1"), Some("KL Open"), None)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Unresolved);

        let no_name = resolver
            .resolve_for_removal(&app("A1"), None, None)
            .await
            .unwrap();
        assert_eq!(no_name, Resolution::Unresolved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removal_fallback_respects_start_date() {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let last_year = store
            .create_local(&fields("KL Open", "2024-01-15"))
            .await
            .unwrap();
        let last_year = store
            .transfer_ownership(&last_year.id, last_year.version, Ownership::SubmissionOwned)
            .await
            .unwrap();

        let resolver = IdentityResolver::new(store);
        let other_edition = resolver
            .resolve_for_removal(&app("A1"), Some("KL Open"), "2025-01-15".parse().ok())
            .await
            .unwrap();
        assert_eq!(other_edition, Resolution::Unresolved);

        let same_edition = resolver
            .resolve_for_removal(&app("A1"), Some("kl open"), "2024-01-15".parse().ok())
            .await
            .unwrap();
        assert!(matches!(
            same_edition,
            Resolution::ByNameHeuristic { tournament, candidates: 1 } if tournament.id == last_year.id
        ));

        let undated = resolver
            .resolve_for_removal(&app("A1"), Some("KL Open"), None)
            .await
            .unwrap();
        assert!(matches!(undated, Resolution::ByNameHeuristic { .. }));
    }
}
