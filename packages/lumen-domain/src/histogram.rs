//! Fixed-cardinality downsampling of scalar series.
//!
//! A series is described by its axis range `[min, max]`. The range is split into equal-width
//! buckets anchored at `min`, so that every series sharing the same range shares the same bucket
//! keys. Each non-empty bucket yields one point: its key and the mean of the values that fell in
//! it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
	pub min: i64,
	pub max: i64,
}
impl AxisRange {
	pub fn new(min: i64, max: i64) -> Self {
		if min <= max { Self { min, max } } else { Self { min: max, max: min } }
	}

	pub fn union(self, other: Self) -> Self {
		Self { min: self.min.min(other.min), max: self.max.max(other.max) }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLayout {
	pub origin: i64,
	pub width: i64,
	pub count: u32,
}
impl BucketLayout {
	/// Partitions `range` into at most `samples` equal-width buckets. The width is the integer
	/// `ceil(span / samples)`, so a span just above `samples` yields about half as many buckets.
	pub fn for_range(range: AxisRange, samples: u32) -> Self {
		let samples = i128::from(samples.max(1));
		let span = i128::from(range.max) - i128::from(range.min) + 1;
		let width = ((span + samples - 1) / samples).max(1);
		let count = (span + width - 1) / width;

		Self {
			origin: range.min,
			width: i64::try_from(width).unwrap_or(i64::MAX),
			count: u32::try_from(count).unwrap_or(u32::MAX),
		}
	}

	pub fn index_of(&self, x: i64) -> Option<u32> {
		let offset = i128::from(x) - i128::from(self.origin);

		if offset < 0 {
			return None;
		}

		let index = offset / i128::from(self.width);

		u32::try_from(index).ok().filter(|index| *index < self.count)
	}

	pub fn key_of(&self, index: u32) -> i64 {
		let key = i128::from(self.origin) + i128::from(index) * i128::from(self.width);

		i64::try_from(key).unwrap_or(i64::MAX)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub x: i64,
	pub y: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
	sum: f64,
	count: u64,
}

/// Streaming accumulator for one series. Memory is bounded by the bucket count, not by the
/// number of samples pushed.
#[derive(Debug, Clone)]
pub struct SeriesAccumulator {
	layout: BucketLayout,
	buckets: BTreeMap<u32, Bucket>,
	skipped: u64,
}
impl SeriesAccumulator {
	pub fn new(layout: BucketLayout) -> Self {
		Self { layout, buckets: BTreeMap::new(), skipped: 0 }
	}

	pub fn layout(&self) -> BucketLayout {
		self.layout
	}

	/// Samples outside the layout or with non-finite values are counted and dropped.
	pub fn push(&mut self, x: i64, value: f64) {
		let Some(index) = self.layout.index_of(x).filter(|_| value.is_finite()) else {
			self.skipped += 1;

			return;
		};
		let bucket = self.buckets.entry(index).or_default();

		bucket.sum += value;
		bucket.count += 1;
	}

	pub fn skipped(&self) -> u64 {
		self.skipped
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}

	pub fn finish(self) -> Vec<Point> {
		let layout = self.layout;

		self.buckets
			.into_iter()
			.map(|(index, bucket)| Point {
				x: layout.key_of(index),
				y: bucket.sum / bucket.count as f64,
			})
			.collect()
	}
}

/// Clamps a requested sample count into `[1, max]`, substituting `default` when absent.
pub fn clamp_samples(requested: Option<i64>, default: u32, max: u32) -> u32 {
	let max = max.max(1);

	match requested {
		None => default.clamp(1, max),
		Some(value) => value.clamp(1, i64::from(max)) as u32,
	}
}

/// Convenience for in-memory series: buckets `samples` into at most `max_points` points.
pub fn downsample(samples: &[(i64, f64)], max_points: u32) -> Vec<Point> {
	let Some(range) = samples
		.iter()
		.map(|(x, _)| AxisRange::new(*x, *x))
		.reduce(AxisRange::union)
	else {
		return Vec::new();
	};
	let mut acc = SeriesAccumulator::new(BucketLayout::for_range(range, max_points));

	for (x, y) in samples {
		acc.push(*x, *y);
	}

	acc.finish()
}
