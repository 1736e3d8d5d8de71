//! Constellation extraction: strict local maxima over a square
//! neighborhood of the dB spectrogram.

use rayon::prelude::*;

use super::{Peak, FLOOR_DB, PEAK_NEIGHBORHOOD};

/// Find spectral peaks in a `[t][f]` dB matrix.
///
/// A bin is a peak when it reaches [`FLOOR_DB`] and strictly exceeds
/// every other bin of its neighborhood; an equal neighbor disqualifies
/// the candidate. Edges are extended by mirror reflection, with
/// reflected images of the candidate itself skipped so edge peaks stay
/// eligible. Output is sorted by time bin, then frequency bin.
pub fn find_peaks(spectrum: &[Vec<f32>]) -> Vec<Peak> {
    let t_len = spectrum.len();
    if t_len == 0 {
        return Vec::new();
    }
    let f_len = spectrum[0].len();
    if f_len == 0 {
        return Vec::new();
    }

    // Even-sized window centered like a maximum filter: offsets -N/2..N/2-1.
    let half = (PEAK_NEIGHBORHOOD / 2) as isize;

    (0..t_len)
        .into_par_iter()
        .map(|t| {
            let mut column = Vec::new();
            'bins: for f in 0..f_len {
                let value = spectrum[t][f];
                if value < FLOOR_DB {
                    continue;
                }

                for dt in -half..half {
                    for df in -half..half {
                        if dt == 0 && df == 0 {
                            continue;
                        }
                        let tt = reflect(t as isize + dt, t_len);
                        let ff = reflect(f as isize + df, f_len);
                        if tt == t && ff == f {
                            continue;
                        }
                        if spectrum[tt][ff] >= value {
                            continue 'bins;
                        }
                    }
                }

                column.push(Peak {
                    t: t as u32,
                    f: f as u32,
                });
            }
            column
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Mirror an index into `0..len` without repeating the edge sample.
fn reflect(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let mut index = index;
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * (len - 1) - index;
        } else {
            return index as usize;
        }
    }
}
