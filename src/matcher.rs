//! Offset-histogram matching of query fingerprints against the catalog.
//!
//! Every posting that shares a hash with the query votes for the
//! alignment `anchor_time - query_time`; a true match concentrates its
//! votes on a single offset while chance collisions scatter.

use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::fingerprint::{Fingerprint, PairHash};

/// Minimum height of the winning histogram bucket.
pub const MIN_ALIGNED: u32 = 5;
/// Minimum lead of the winner over the runner-up.
pub const MIN_RATIO: f32 = 2.0;
/// Minimum confidence percentage.
pub const MIN_CONFIDENCE: f32 = 10.0;

/// An accepted candidate and its scoring statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub song_id: i64,
    /// Height of the winning offset bucket.
    pub aligned: u32,
    /// Winning offset in frames (catalog time minus query time).
    pub offset: i64,
    /// `100 * aligned / query hash count`, clamped to 0..=100.
    pub confidence: f32,
    /// Winner bucket height over the runner-up's.
    pub score_ratio: f32,
}

/// Match `query` against the catalog index. Returns `None` when no
/// candidate clears the acceptance gates; empty queries are a `None`,
/// never an error.
pub async fn find_match(
    catalog: &Catalog,
    query: &[Fingerprint],
) -> Result<Option<MatchReport>, EngineError> {
    if query.is_empty() {
        return Ok(None);
    }

    let hashes: Vec<PairHash> = query.iter().map(|fp| fp.hash).collect();
    let postings = catalog.lookup(&hashes).await?;
    Ok(score_postings(query, &postings))
}

/// Pure scoring step, separated from the index probe for testability.
pub fn score_postings(
    query: &[Fingerprint],
    postings: &HashMap<PairHash, Vec<(i64, u32)>>,
) -> Option<MatchReport> {
    if query.is_empty() || postings.is_empty() {
        return None;
    }

    // song -> offset -> votes
    let mut histograms: HashMap<i64, HashMap<i64, u32>> = HashMap::new();
    for fingerprint in query {
        let Some(hits) = postings.get(&fingerprint.hash) else {
            continue;
        };
        for &(song_id, anchor_time) in hits {
            let delta = anchor_time as i64 - fingerprint.anchor_time as i64;
            *histograms
                .entry(song_id)
                .or_default()
                .entry(delta)
                .or_default() += 1;
        }
    }

    // Per-song histogram peak, ranked best-first.
    let mut ranked: Vec<(i64, u32, i64)> = histograms
        .into_iter()
        .filter_map(|(song_id, histogram)| {
            histogram
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(offset, votes)| (song_id, votes, offset))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let &(song_id, aligned, offset) = ranked.first()?;
    let runner_up = ranked.get(1).map(|&(_, votes, _)| votes).unwrap_or(0);

    let confidence = (100.0 * aligned as f32 / query.len().max(1) as f32).clamp(0.0, 100.0);
    let score_ratio = aligned as f32 / runner_up.max(1) as f32;

    if aligned >= MIN_ALIGNED && score_ratio >= MIN_RATIO && confidence >= MIN_CONFIDENCE {
        Some(MatchReport {
            song_id,
            aligned,
            offset,
            confidence,
            score_ratio,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewSong;
    use crate::fingerprint::{fingerprint_samples, pair_hash, SAMPLE_RATE};
    use crate::testsupport::{noise, rumble, tone_ladder};

    fn query_of(count: u32) -> Vec<Fingerprint> {
        (0..count)
            .map(|i| Fingerprint {
                hash: pair_hash(i, i + 1, 1),
                anchor_time: i,
            })
            .collect()
    }

    /// Postings aligning the first `aligned` query hashes of `query`
    /// against `song_id` at a fixed offset.
    fn aligned_postings(
        postings: &mut HashMap<PairHash, Vec<(i64, u32)>>,
        query: &[Fingerprint],
        song_id: i64,
        offset: u32,
        aligned: usize,
    ) {
        for fingerprint in &query[..aligned] {
            postings
                .entry(fingerprint.hash)
                .or_default()
                .push((song_id, fingerprint.anchor_time + offset));
        }
    }

    #[test]
    fn aligned_song_wins_with_expected_statistics() {
        let query = query_of(20);
        let mut postings = HashMap::new();
        aligned_postings(&mut postings, &query, 1, 50, 15);
        // scattered runner-up: three hits at three different offsets
        for (i, fingerprint) in query.iter().take(3).enumerate() {
            postings
                .entry(fingerprint.hash)
                .or_default()
                .push((2, fingerprint.anchor_time + 90 + i as u32 * 7));
        }

        let report = score_postings(&query, &postings).unwrap();
        assert_eq!(report.song_id, 1);
        assert_eq!(report.aligned, 15);
        assert_eq!(report.offset, 50);
        assert!((report.confidence - 75.0).abs() < f32::EPSILON);
        assert!(report.score_ratio >= MIN_RATIO);
    }

    #[test]
    fn too_few_aligned_hashes_are_rejected() {
        let query = query_of(20);
        let mut postings = HashMap::new();
        aligned_postings(&mut postings, &query, 1, 50, 4);

        assert!(score_postings(&query, &postings).is_none());
    }

    #[test]
    fn close_runner_up_fails_the_ratio_gate() {
        let query = query_of(40);
        let mut postings = HashMap::new();
        aligned_postings(&mut postings, &query, 1, 50, 10);
        aligned_postings(&mut postings, &query, 2, 120, 9);

        assert!(score_postings(&query, &postings).is_none());
    }

    #[test]
    fn low_confidence_fails_even_when_aligned() {
        let query = query_of(200);
        let mut postings = HashMap::new();
        aligned_postings(&mut postings, &query, 1, 50, 10);

        // 10 aligned of 200 hashes: 5% confidence
        assert!(score_postings(&query, &postings).is_none());
    }

    #[test]
    fn empty_inputs_never_match() {
        assert!(score_postings(&[], &HashMap::new()).is_none());
        assert!(score_postings(&query_of(5), &HashMap::new()).is_none());
    }

    // End-to-end recognition against a real (in-memory) catalog.

    async fn catalog_with(songs: &[(&str, &[f32])]) -> (Catalog, Vec<i64>) {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for (title, samples) in songs {
            let fingerprints = fingerprint_samples(samples);
            assert!(!fingerprints.is_empty());
            let song = NewSong {
                title: title.to_string(),
                artist: "Synth".to_string(),
                album: String::new(),
                duration: samples.len() as f64 / SAMPLE_RATE as f64,
                path: format!("/music/{title}.wav"),
                file_hash: title.to_string(),
                metadata: None,
            };
            ids.push(catalog.add_song(&song, &fingerprints).await.unwrap());
        }
        (catalog, ids)
    }

    fn excerpt(samples: &[f32], from_secs: f64, secs: f64) -> Vec<f32> {
        let start = (from_secs * SAMPLE_RATE as f64) as usize;
        let end = start + (secs * SAMPLE_RATE as f64) as usize;
        samples[start..end].to_vec()
    }

    #[tokio::test]
    async fn recognizes_an_excerpt_of_an_indexed_song() {
        let song_a = tone_ladder(1, 24.0, SAMPLE_RATE, 0.5);
        let song_b = tone_ladder(2, 24.0, SAMPLE_RATE, 0.5);
        let (catalog, ids) =
            catalog_with(&[("a", song_a.as_slice()), ("b", song_b.as_slice())]).await;

        // hop-aligned start (~14.9s in), 6 seconds long
        let start = 160 * crate::fingerprint::HOP_SIZE;
        let query = fingerprint_samples(&song_a[start..start + 6 * SAMPLE_RATE as usize]);
        let report = find_match(&catalog, &query).await.unwrap().unwrap();

        assert_eq!(report.song_id, ids[0]);
        assert!(report.aligned >= MIN_ALIGNED);
        assert!(report.score_ratio >= MIN_RATIO);
        assert!(report.confidence >= 30.0);
    }

    #[tokio::test]
    async fn recognizes_through_additive_noise() {
        let song = tone_ladder(3, 24.0, SAMPLE_RATE, 0.5);
        let (catalog, ids) = catalog_with(&[("a", song.as_slice())]).await;

        // low-frequency rumble at roughly 10 dB SNR against the ladder
        let clean = excerpt(&song, 10.0, 6.0);
        let signal_rms =
            (clean.iter().map(|v| v * v).sum::<f32>() / clean.len() as f32).sqrt();
        let interference = rumble(clean.len(), 99, signal_rms / 3.16);
        let noisy: Vec<f32> = clean
            .iter()
            .zip(&interference)
            .map(|(s, n)| s + n)
            .collect();

        let query = fingerprint_samples(&noisy);
        let report = find_match(&catalog, &query).await.unwrap().unwrap();

        assert_eq!(report.song_id, ids[0]);
        assert!(report.confidence >= 15.0);
    }

    #[tokio::test]
    async fn recognition_survives_a_resample_round_trip() {
        use crate::audio::resample_all;

        let song = tone_ladder(4, 22.0, SAMPLE_RATE, 0.5);
        let (catalog, ids) = catalog_with(&[("a", song.as_slice())]).await;

        let down = resample_all(&song, SAMPLE_RATE, 16_000).unwrap();
        let back = resample_all(&down, 16_000, SAMPLE_RATE).unwrap();
        let query = fingerprint_samples(&excerpt(&back, 8.0, 6.0));
        let report = find_match(&catalog, &query).await.unwrap().unwrap();

        assert_eq!(report.song_id, ids[0]);
    }

    #[tokio::test]
    async fn white_noise_matches_nothing() {
        let song_a = tone_ladder(5, 24.0, SAMPLE_RATE, 0.5);
        let song_b = tone_ladder(6, 24.0, SAMPLE_RATE, 0.5);
        let (catalog, _) =
            catalog_with(&[("a", song_a.as_slice()), ("b", song_b.as_slice())]).await;

        let query = fingerprint_samples(&noise(6 * SAMPLE_RATE as usize, 7, 0.5));
        assert!(find_match(&catalog, &query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_songs_are_never_recognized() {
        let song_a = tone_ladder(8, 24.0, SAMPLE_RATE, 0.5);
        let song_b = tone_ladder(9, 24.0, SAMPLE_RATE, 0.5);
        let (catalog, ids) =
            catalog_with(&[("a", song_a.as_slice()), ("b", song_b.as_slice())]).await;

        catalog.delete_song(ids[0]).await.unwrap();

        let query = fingerprint_samples(&excerpt(&song_a, 15.1, 6.0));
        assert!(find_match(&catalog, &query).await.unwrap().is_none());
    }
}
