use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::models::Record;

/// Records partitioned by one discriminant field. Every declared value has a
/// bucket, in declaration order, even when it is empty.
#[derive(Debug, Clone)]
pub struct StatusBuckets<'a> {
    field: String,
    buckets: Vec<(String, Vec<&'a Record>)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub value: String,
    pub count: usize,
}

impl<'a> StatusBuckets<'a> {
    fn empty(field: &str, known_values: &[&str]) -> Self {
        let mut buckets: Vec<(String, Vec<&'a Record>)> = Vec::with_capacity(known_values.len());
        for value in known_values {
            if !buckets.iter().any(|(existing, _)| existing.as_str() == *value) {
                buckets.push((value.to_string(), Vec::new()));
            }
        }
        Self {
            field: field.to_string(),
            buckets,
        }
    }

    fn position(&self, value: &str) -> Option<usize> {
        self.buckets
            .iter()
            .position(|(name, _)| name.as_str() == value)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Records in `value`'s bucket; unknown values give an empty slice.
    pub fn get(&self, value: &str) -> &[&'a Record] {
        self.buckets
            .iter()
            .find(|(name, _)| name.as_str() == value)
            .map(|(_, records)| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn count(&self, value: &str) -> usize {
        self.get(value).len()
    }

    pub fn counts(&self) -> Vec<BucketCount> {
        self.buckets
            .iter()
            .map(|(value, records)| BucketCount {
                value: value.clone(),
                count: records.len(),
            })
            .collect()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|(_, records)| records.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[&'a Record])> {
        self.buckets
            .iter()
            .map(|(value, records)| (value.as_str(), records.as_slice()))
    }
}

/// A record whose discriminant is outside the declared set. `value` is
/// `None` when the field is absent, null, or not a scalar.
#[derive(Debug, Clone)]
pub struct UnknownBucketValue<'a> {
    pub record: &'a Record,
    pub value: Option<String>,
}

#[derive(Debug, Error)]
#[error(
    "{} record(s) have a `{}` value outside the declared buckets: {}",
    .unknown.len(),
    .partial.field,
    describe(.unknown)
)]
pub struct UnknownBucketValues<'a> {
    /// Buckets holding every record that did match.
    pub partial: StatusBuckets<'a>,
    pub unknown: Vec<UnknownBucketValue<'a>>,
}

fn describe(unknown: &[UnknownBucketValue<'_>]) -> String {
    let mut values: Vec<&str> = unknown
        .iter()
        .map(|entry| entry.value.as_deref().unwrap_or("<missing>"))
        .collect();
    values.sort_unstable();
    values.dedup();
    values.join(", ")
}

impl<'a> UnknownBucketValues<'a> {
    /// Appends an extra bucket named `label` holding the unmatched records.
    /// If `label` is already a declared value the records join that bucket.
    pub fn into_with_other(self, label: &str) -> StatusBuckets<'a> {
        let mut buckets = self.partial;
        let records: Vec<&'a Record> = self.unknown.into_iter().map(|entry| entry.record).collect();
        match buckets.position(label) {
            Some(index) => buckets.buckets[index].1.extend(records),
            None => buckets.buckets.push((label.to_string(), records)),
        }
        buckets
    }

    /// Keeps only the declared buckets. The dropped records are logged.
    pub fn discard_unknown(self) -> StatusBuckets<'a> {
        warn!(
            target: "fieldforge::bucket",
            field = %self.partial.field,
            dropped = self.unknown.len(),
            values = %describe(&self.unknown),
            "discarding records with undeclared bucket values"
        );
        self.partial
    }
}

/// Partitions `records` by `field` into one bucket per `known_values` entry.
/// Any record that fits none of them is reported rather than dropped.
pub fn bucket<'a>(
    records: &'a [Record],
    field: &str,
    known_values: &[&str],
) -> Result<StatusBuckets<'a>, UnknownBucketValues<'a>> {
    let mut buckets = StatusBuckets::empty(field, known_values);
    let mut unknown = Vec::new();

    for record in records {
        let value = record.key_field(field);
        match value.as_deref().and_then(|value| buckets.position(value)) {
            Some(index) => buckets.buckets[index].1.push(record),
            None => unknown.push(UnknownBucketValue { record, value }),
        }
    }

    if unknown.is_empty() {
        Ok(buckets)
    } else {
        Err(UnknownBucketValues {
            partial: buckets,
            unknown,
        })
    }
}
