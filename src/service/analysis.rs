use std::collections::BTreeMap;

use sqlx::{Pool, Postgres};

use crate::{
    dao::{artists::ArtistDao, charts::{ChartDao, QueryForeignEntryDbResp}, clusters::ClusterDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistRankType, CountryDevelopmentOutputType, CountryPotentialType, ExportPotentialOutputType},
    },
};

/**
 * Rank reported for an artist that never charted in a destination country.
 */
const NOT_FOUND_RANK: i32 = 200;

/**
 * Represents the service for the analytical queries layered on top of the
 * chart data.
 */
pub struct ExportAnalysisService {
    artist_dao: ArtistDao,
    chart_dao: ChartDao,
    cluster_dao: ClusterDao,
    connection_pool: Pool<Postgres>,
}

impl ExportAnalysisService {
    /**
     * Creates a new instance of `ExportAnalysisService`.
     */
    pub fn new(artist_dao: ArtistDao, chart_dao: ChartDao, cluster_dao: ClusterDao, connection_pool: Pool<Postgres>) -> Self {
        ExportAnalysisService { artist_dao, chart_dao, cluster_dao, connection_pool }
    }

    /**
     * Describes the market development of a country: its cluster label,
     * the number of distinct charting artists and the number of charts.
     *
     * # Arguments
     * `iso2`: The country to analyze.
     *
     * # Returns
     * A Result containing the development output or an `ApplicationError`.
     */
    pub async fn country_development(&self, iso2: &str) -> Result<CountryDevelopmentOutputType, ApplicationError> {
        let mut connection = self.acquire().await?;
        let cluster = self
            .cluster_dao
            .get_cluster_by_country(&mut connection, iso2)
            .await?
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Country or cluster not found".to_string()))?;
        let artist_count = self.chart_dao.count_distinct_artists_for_country(&mut connection, iso2).await?;
        let chart_count = self.chart_dao.count_charts_for_country(&mut connection, iso2).await?;
        Ok(CountryDevelopmentOutputType { country: cluster.country, cluster: cluster.cluster, artist_count, chart_count })
    }

    /**
     * Estimates where an artist could export: collects the chart entries
     * of same-nationality peers in charts of other countries the artist is
     * absent from, and groups them by destination country and peer name
     * with the best rank per peer.
     *
     * # Arguments
     * `artist_id`: The artist to analyze.
     *
     * # Returns
     * A Result containing the export potential output or an `ApplicationError`.
     */
    pub async fn export_potential(&self, artist_id: i64) -> Result<ExportPotentialOutputType, ApplicationError> {
        let mut connection = self.acquire().await?;
        let artist = self.artist_dao.get_artist(&mut connection, artist_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Artist not found".to_string()))?;
        let rows = self.chart_dao.list_foreign_entries(&mut connection, &artist.nationality, artist.id).await?;
        let foreign_chart_entries = rows.len() as i64;
        let countries = group_foreign_entries(rows);
        Ok(ExportPotentialOutputType { artist, foreign_chart_entries, countries })
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, ApplicationError> {
        self.connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }
}

/**
 * Groups foreign chart entry rows by destination country and peer name,
 * keeping the best (lowest) rank per peer. A rank above the sentinel is
 * reported as the sentinel.
 */
fn group_foreign_entries(rows: Vec<QueryForeignEntryDbResp>) -> Vec<CountryPotentialType> {
    let mut grouped: BTreeMap<String, BTreeMap<String, i32>> = BTreeMap::new();
    for (country, name, rank) in rows {
        let best = grouped.entry(country).or_default().entry(name).or_insert(NOT_FOUND_RANK);
        if rank < *best {
            *best = rank;
        }
    }
    grouped
        .into_iter()
        .map(|(country, artists)| CountryPotentialType { country, artists: artists.into_iter().map(|(name, rank)| ArtistRankType { name, rank }).collect() })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_group_foreign_entries_groups_by_country() {
        let rows = vec![("DE".to_string(), "Peer A".to_string(), 5), ("IT".to_string(), "Peer B".to_string(), 10)];
        let result = group_foreign_entries(rows);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].country, "DE");
        assert_eq!(result[0].artists[0].name, "Peer A");
        assert_eq!(result[0].artists[0].rank, 5);
        assert_eq!(result[1].country, "IT");
        assert_eq!(result[1].artists[0].rank, 10);
    }

    #[test]
    fn test_group_foreign_entries_keeps_minimum_rank() {
        let rows = vec![("DE".to_string(), "Peer A".to_string(), 17), ("DE".to_string(), "Peer A".to_string(), 3), ("DE".to_string(), "Peer A".to_string(), 44)];
        let result = group_foreign_entries(rows);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].artists.len(), 1);
        assert_eq!(result[0].artists[0].rank, 3);
    }

    #[test]
    fn test_group_foreign_entries_caps_rank_at_sentinel() {
        let rows = vec![("DE".to_string(), "Peer A".to_string(), 412)];
        let result = group_foreign_entries(rows);
        assert_eq!(result[0].artists[0].rank, NOT_FOUND_RANK);
    }

    #[test]
    fn test_group_foreign_entries_empty() {
        let result = group_foreign_entries(vec![]);
        assert!(result.is_empty());
    }
}
