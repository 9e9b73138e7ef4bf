//! Histogram matching through empirical CDFs

/// Sorted unique values, their counts and each input's bin index
fn unique_with_inverse(values: &[f32]) -> (Vec<f32>, Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut uniques: Vec<f32> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut bins = vec![0_usize; values.len()];

    for &idx in &order {
        let value = values[idx];
        match uniques.last() {
            Some(last) if last.total_cmp(&value).is_eq() => {
                if let Some(count) = counts.last_mut() {
                    *count += 1;
                }
            },
            _ => {
                uniques.push(value);
                counts.push(1);
            },
        }
        bins[idx] = uniques.len() - 1;
    }

    (uniques, counts, bins)
}

fn quantiles(counts: &[usize]) -> Vec<f64> {
    let total: usize = counts.iter().sum();
    let mut running = 0_usize;
    counts
        .iter()
        .map(|&c| {
            running += c;
            running as f64 / total as f64
        })
        .collect()
}

/// Piecewise-linear interpolation, exact at the knots and clamped at the ends
///
/// `xp` must be strictly increasing and the same length as `fp`.
#[must_use]
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (xp.first(), xp.last()) else {
        return x;
    };
    if x <= first {
        return fp[0];
    }
    if x >= last {
        return fp[fp.len() - 1];
    }

    let upper = xp.partition_point(|&v| v <= x);
    let lower = upper - 1;
    if xp[lower] == x {
        return fp[lower];
    }
    let t = (x - xp[lower]) / (xp[upper] - xp[lower]);
    fp[lower] + t * (fp[upper] - fp[lower])
}

/// Remap `source` so its value distribution follows `template`
///
/// Each source value moves to the template value at the same cumulative
/// quantile. An empty `template` leaves the source unchanged.
#[must_use]
pub fn match_histogram(source: &[f32], template: &[f32]) -> Vec<f32> {
    if source.is_empty() || template.is_empty() {
        return source.to_vec();
    }

    let (source_values, source_counts, bins) = unique_with_inverse(source);
    let (template_values, template_counts, _) = unique_with_inverse(template);

    let source_quantiles = quantiles(&source_counts);
    let template_quantiles = quantiles(&template_counts);
    let template_values: Vec<f64> = template_values.iter().map(|&v| f64::from(v)).collect();

    let mapped: Vec<f32> = source_quantiles
        .iter()
        .map(|&q| interp(q, &template_quantiles, &template_values) as f32)
        .collect();

    debug_assert_eq!(mapped.len(), source_values.len());
    bins.into_iter().map(|bin| mapped[bin]).collect()
}
