use treadsim_geom::Aabb;

#[derive(Copy, Clone)]
struct Elem { min: f32, max: f32, idx: usize }

/// Deterministic 1D SAP along X with full AABB overlap, NaN-safe and stable.
pub fn pairs_sap(aabbs: &[Aabb]) -> Vec<(usize, usize)> {
    sweep(aabbs, |_, _| true)
}

/// Same as [`pairs_sap`] but drops pairs sharing an owner (colliders of one body).
/// `owner.len()` must equal `aabbs.len()`.
pub fn pairs_sap_grouped(aabbs: &[Aabb], owner: &[u32]) -> Vec<(usize, usize)> {
    debug_assert_eq!(aabbs.len(), owner.len());
    sweep(aabbs, |i, k| owner[i] != owner[k])
}

fn sweep<F: Fn(usize, usize) -> bool>(aabbs: &[Aabb], keep: F) -> Vec<(usize, usize)> {
    // Build projections; skip invalid boxes deterministically
    let mut elems: Vec<Elem> = Vec::with_capacity(aabbs.len());
    for (i, a) in aabbs.iter().enumerate() {
        let mut mn = a.min.x;
        let mut mx = a.max.x;
        if !mn.is_finite() || !mx.is_finite() { continue; }
        if mn > mx { core::mem::swap(&mut mn, &mut mx); }
        elems.push(Elem { min: mn, max: mx, idx: i });
    }

    elems.sort_by(|a, b| a.min.total_cmp(&b.min).then(a.idx.cmp(&b.idx)));

    let mut active: Vec<Elem> = Vec::new();
    let mut out: Vec<(usize, usize)> = Vec::new();

    for e in elems {
        active.retain(|j| j.max >= e.min);
        for j in &active {
            let (i, k) = if j.idx < e.idx { (j.idx, e.idx) } else { (e.idx, j.idx) };
            if !keep(i, k) { continue; }
            if aabbs[i].overlaps(&aabbs[k]) { out.push((i, k)); }
        }
        active.push(e);
    }

    out.sort_unstable();
    out
}
