//! Feature importance ranking

use crate::error::{ChurnError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// One entry of a ranked importance list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub name: String,
    pub importance: f64,
    /// Column position in the transformed feature vector
    pub index: usize,
}

/// Rank features by importance, highest first, keeping the `top_n` best.
///
/// Equal scores keep their original column order.
pub fn rank_features(importances: &Array1<f64>, names: &[String], top_n: usize) -> Result<Vec<RankedFeature>> {
    if top_n == 0 {
        return Err(ChurnError::range("top_n", top_n, "must be at least 1"));
    }
    if importances.len() != names.len() {
        return Err(ChurnError::shape(
            format!("{} feature names", importances.len()),
            format!("{} feature names", names.len()),
        ));
    }
    if let Some((i, score)) = importances.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(ChurnError::range(
            &format!("importance[{}]", i),
            score,
            "must be finite",
        ));
    }

    let mut order: Vec<usize> = (0..names.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| importances[b].total_cmp(&importances[a]));

    Ok(order
        .into_iter()
        .take(top_n)
        .map(|index| RankedFeature {
            name: names[index].clone(),
            importance: importances[index],
            index,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_descending_and_truncated() {
        let ranked = rank_features(&array![0.1, 0.5, 0.15, 0.25], &names(4), 2).unwrap();
        let got: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(got, vec!["f1", "f3"]);
        assert_eq!(ranked[0].index, 1);
    }

    #[test]
    fn test_ties_keep_lower_index_first() {
        let scores = array![0.2, 0.3, 0.2, 0.3];
        let first = rank_features(&scores, &names(4), 10).unwrap();
        let second = rank_features(&scores, &names(4), 10).unwrap();

        let order: Vec<usize> = first.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rank_errors() {
        assert!(matches!(
            rank_features(&array![0.5, 0.5], &names(2), 0),
            Err(ChurnError::RangeError { .. })
        ));
        assert!(matches!(
            rank_features(&array![0.5, f64::NAN], &names(2), 1),
            Err(ChurnError::RangeError { .. })
        ));
        assert!(matches!(
            rank_features(&array![0.5], &names(2), 1),
            Err(ChurnError::ShapeError { .. })
        ));
    }
}
