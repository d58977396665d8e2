//! Cosine-similarity ranking over the whole persisted corpus.

use tracing::warn;

use crate::vector_store::VectorStoreRecord;

/// A fragment scored against the current query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedFragment<'a> {
    /// Source document the fragment came from.
    pub source: &'a str,
    /// Fragment text.
    pub text: &'a str,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Scales `vector` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value = (f64::from(*value) / norm) as f32;
    }
}

/// Returns a unit-norm copy of `vector`.
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut out = vector.to_vec();
    normalize(&mut out);
    out
}

/// Dot product, accumulated in `f64`.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum::<f64>() as f32
}

/// Cosine similarity of two vectors; `None` when their dimensions differ.
///
/// A zero vector has similarity zero with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(dot(&normalized(a), &normalized(b)))
}

fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&value| f64::from(value) * f64::from(value))
        .sum::<f64>()
        .sqrt()
}

/// Scores every fragment of every record against `query` and sorts them by
/// descending similarity. Equal scores keep corpus order.
///
/// Fragments whose dimensionality differs from the query's were produced by a
/// different embedding model; they are left out of the ranking, as are
/// fragments whose score is not finite (overflowed stored components).
pub fn rank<'a>(query: &[f32], records: &'a [VectorStoreRecord]) -> Vec<RankedFragment<'a>> {
    let query = normalized(query);
    let mut ranked = Vec::new();
    let mut mismatched = 0usize;
    let mut non_finite = 0usize;
    for record in records {
        for fragment in &record.fragments {
            if fragment.embedding.len() != query.len() {
                mismatched += 1;
                continue;
            }
            let score = dot(&query, &normalized(&fragment.embedding));
            if !score.is_finite() {
                non_finite += 1;
                continue;
            }
            ranked.push(RankedFragment {
                source: &record.source_name,
                text: &fragment.text,
                score,
            });
        }
    }
    if non_finite > 0 {
        warn!(non_finite, "ignoring fragments with non-finite similarity");
    }
    if mismatched > 0 {
        warn!(
            mismatched,
            expected_dimensions = query.len(),
            "ignoring fragments embedded with a different dimensionality"
        );
    }
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::StoredFragment;

    const EPSILON: f32 = 1e-5;

    fn record(name: &str, fragments: &[(&str, &[f32])]) -> VectorStoreRecord {
        VectorStoreRecord {
            source_name: name.to_string(),
            fragments: fragments
                .iter()
                .map(|(text, embedding)| StoredFragment {
                    text: text.to_string(),
                    embedding: embedding.to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn normalize_yields_unit_norm() {
        for vector in [vec![3.0, 4.0], vec![-1.0, 2.0, 0.5], vec![1e-3; 1536]] {
            let unit = normalized(&vector);
            assert!((l2_norm(&unit) - 1.0).abs() < 1e-5, "{vector:?}");
        }
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut zero = vec![0.0f32; 4];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn cosine_similarity_identities() {
        let a = [0.3, -1.2, 4.0];
        let b = [2.0, 0.1, -0.7];
        let neg_a: Vec<f32> = a.iter().map(|v| -v).collect();

        let same = cosine_similarity(&a, &a).expect("same dims");
        assert!((same - 1.0).abs() < EPSILON);
        let opposite = cosine_similarity(&a, &neg_a).expect("same dims");
        assert!((opposite + 1.0).abs() < EPSILON);
        let ab = cosine_similarity(&a, &b).expect("same dims");
        let ba = cosine_similarity(&b, &a).expect("same dims");
        assert!((ab - ba).abs() < EPSILON);
        assert_eq!(cosine_similarity(&a, &[0.0; 3]), Some(0.0));
        assert_eq!(cosine_similarity(&a, &[1.0, 2.0]), None);
    }

    #[test]
    fn ranks_globally_in_descending_order() {
        let records = vec![
            record("a.txt", &[("far", &[0.0, 1.0]), ("close", &[1.0, 0.1])]),
            record("b.txt", &[("exact", &[2.0, 0.0]), ("opposite", &[-1.0, 0.0])]),
        ];
        let ranked = rank(&[1.0, 0.0], &records);
        let texts: Vec<&str> = ranked.iter().map(|fragment| fragment.text).collect();
        assert_eq!(texts, vec!["exact", "close", "far", "opposite"]);
        assert_eq!(ranked[0].source, "b.txt");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn equal_scores_keep_corpus_order() {
        let records = vec![
            record("a.txt", &[("first", &[1.0, 1.0]), ("low", &[0.0, -1.0])]),
            record("b.txt", &[("second", &[2.0, 2.0]), ("third", &[0.5, 0.5])]),
        ];
        let ranked = rank(&[1.0, 1.0], &records);
        let texts: Vec<&str> = ranked.iter().map(|fragment| fragment.text).collect();
        assert_eq!(texts, vec!["first", "second", "third", "low"]);
    }

    #[test]
    fn drops_fragments_with_overflowed_components() {
        let json = r#"{"sourceFileName":"big.txt","embeddings":[
            {"text":"overflow","embeddings":[1e39,0.0]},
            {"text":"fine","embeddings":[1.0,0.0]}]}"#;
        let big: VectorStoreRecord = serde_json::from_str(json).unwrap();
        let records = vec![big; 30];
        let ranked = rank(&[1.0, 0.0], &records);
        assert_eq!(ranked.len(), 30);
        assert!(ranked.iter().all(|fragment| fragment.text == "fine"));
        assert!(ranked
            .iter()
            .all(|fragment| (-1.0..=1.0).contains(&fragment.score)));
    }

    #[test]
    fn skips_mismatched_dimensions_and_scores_zero_vectors_as_zero() {
        let records = vec![record(
            "a.txt",
            &[("wrong", &[1.0, 0.0, 0.0]), ("zero", &[0.0, 0.0]), ("ok", &[0.0, 1.0])],
        )];
        let ranked = rank(&[0.0, 1.0], &records);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "ok");
        assert_eq!(ranked[1].text, "zero");
        assert_eq!(ranked[1].score, 0.0);
    }
}
