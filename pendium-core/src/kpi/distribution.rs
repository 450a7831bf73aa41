//! Histogram KPIs: bucket a per-user scalar metric over bin boundaries.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    /// Display label: "[1, 5)" for a bin, "Other" for the overflow bucket
    pub label: String,
    /// Inclusive lower boundary; `None` for the overflow bucket
    pub lower: Option<f64>,
    /// Exclusive upper boundary; `None` for the overflow bucket
    pub upper: Option<f64>,
    pub count: usize,
    /// Emails of the users in the bucket, sorted
    pub members: Vec<String>,
}

/// Check that bin boundaries are usable: at least two, finite, strictly
/// increasing.
pub fn validate_bins(bins: &[f64]) -> Result<()> {
    if bins.len() < 2 {
        return Err(Error::InvalidParameter(
            "bins must contain at least two boundaries".to_string(),
        ));
    }
    if bins.iter().any(|b| !b.is_finite()) {
        return Err(Error::InvalidParameter(
            "bins must be finite numbers".to_string(),
        ));
    }
    if bins.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::InvalidParameter(
            "bins must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

/// Bucket a per-user metric into half-open bins `[b[i], b[i+1])` plus an
/// "Other" overflow bucket for values below the first boundary or at/above
/// the last.
///
/// Every user with a defined value lands in exactly one bucket, so bucket
/// counts (including the overflow) always sum to `values.len()`.
pub fn bin_user_metric(values: &HashMap<String, f64>, bins: &[f64]) -> Result<Vec<DistributionBucket>> {
    validate_bins(bins)?;

    let mut buckets: Vec<DistributionBucket> = bins
        .windows(2)
        .map(|pair| DistributionBucket {
            label: format!("[{}, {})", fmt_boundary(pair[0]), fmt_boundary(pair[1])),
            lower: Some(pair[0]),
            upper: Some(pair[1]),
            count: 0,
            members: Vec::new(),
        })
        .collect();
    let mut overflow = DistributionBucket {
        label: "Other".to_string(),
        lower: None,
        upper: None,
        count: 0,
        members: Vec::new(),
    };

    for (email, value) in values {
        let slot = buckets
            .iter_mut()
            .find(|b| *value >= b.lower.unwrap_or(f64::MIN) && *value < b.upper.unwrap_or(f64::MAX));
        let bucket = slot.unwrap_or(&mut overflow);
        bucket.count += 1;
        bucket.members.push(email.clone());
    }

    buckets.push(overflow);
    for bucket in &mut buckets {
        bucket.members.sort();
    }
    Ok(buckets)
}

fn fmt_boundary(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(email, v)| (email.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_binning_scenario() {
        // Boundaries [0, 1, 5, 10] over values [0, 1, 4, 9, 12]
        let values = values(&[
            ("a@x.com", 0.0),
            ("b@x.com", 1.0),
            ("c@x.com", 4.0),
            ("d@x.com", 9.0),
            ("e@x.com", 12.0),
        ]);

        let buckets = bin_user_metric(&values, &[0.0, 1.0, 5.0, 10.0]).unwrap();
        assert_eq!(buckets.len(), 4);

        assert_eq!(buckets[0].label, "[0, 1)");
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[0].members, vec!["a@x.com"]);

        assert_eq!(buckets[1].label, "[1, 5)");
        assert_eq!(buckets[1].count, 2);
        assert_eq!(buckets[1].members, vec!["b@x.com", "c@x.com"]);

        assert_eq!(buckets[2].label, "[5, 10)");
        assert_eq!(buckets[2].count, 1);

        assert_eq!(buckets[3].label, "Other");
        assert_eq!(buckets[3].count, 1);
        assert_eq!(buckets[3].members, vec!["e@x.com"]);
    }

    #[test]
    fn test_bucket_counts_conserve_users() {
        let values = values(&[
            ("a@x.com", -3.0),
            ("b@x.com", 2.0),
            ("c@x.com", 7.5),
            ("d@x.com", 100.0),
        ]);
        let buckets = bin_user_metric(&values, &[0.0, 5.0, 10.0]).unwrap();

        let total: usize = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, values.len());

        // Values below the first boundary fall into the overflow bucket
        let overflow = buckets.last().unwrap();
        assert!(overflow.members.contains(&"a@x.com".to_string()));
        assert!(overflow.members.contains(&"d@x.com".to_string()));
    }

    #[test]
    fn test_boundary_value_falls_into_upper_bin() {
        let values = values(&[("a@x.com", 5.0)]);
        let buckets = bin_user_metric(&values, &[0.0, 5.0, 10.0]).unwrap();
        assert_eq!(buckets[0].count, 0);
        assert_eq!(buckets[1].count, 1);
    }

    #[test]
    fn test_bad_bins_rejected() {
        let values = HashMap::new();
        assert!(bin_user_metric(&values, &[1.0]).is_err());
        assert!(bin_user_metric(&values, &[1.0, 1.0]).is_err());
        assert!(bin_user_metric(&values, &[5.0, 1.0]).is_err());
        assert!(bin_user_metric(&values, &[0.0, f64::NAN]).is_err());
    }
}
