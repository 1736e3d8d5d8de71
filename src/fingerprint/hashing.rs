//! Combinatorial pair hashing of constellation points.

use std::fmt;

use sha1::{Digest, Sha1};

use super::{Fingerprint, Peak, FAN_OUT, MAX_FREQ_DELTA, MAX_TIME_DELTA, MIN_TIME_DELTA};

/// 80-bit pair hash: the first ten bytes of the SHA-1 digest of the
/// canonical `"f_anchor|f_partner|dt"` string. Rendered as 20 lowercase
/// hex characters at the storage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairHash(pub [u8; 10]);

impl PairHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        let bytes = hex::decode(text).ok()?;
        let bytes: [u8; 10] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for PairHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash one anchor/partner pair.
pub fn pair_hash(f_anchor: u32, f_partner: u32, dt: u32) -> PairHash {
    let mut hasher = Sha1::new();
    hasher.update(format!("{f_anchor}|{f_partner}|{dt}").as_bytes());
    let digest = hasher.finalize();

    let mut hash = [0u8; 10];
    hash.copy_from_slice(&digest[..10]);
    PairHash(hash)
}

/// Pair each anchor peak with up to [`FAN_OUT`] later peaks inside the
/// target zone and emit `(hash, anchor_time)` fingerprints.
///
/// `peaks` must be sorted by `(t, f)`, which is how the peak picker
/// yields them; partners are then visited in ascending `(t, f)` order.
pub fn hash_peaks(peaks: &[Peak]) -> Vec<Fingerprint> {
    let mut fingerprints = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let mut emitted = 0;
        for partner in &peaks[i + 1..] {
            let dt = partner.t - anchor.t;
            if dt > MAX_TIME_DELTA {
                break;
            }
            if dt < MIN_TIME_DELTA {
                continue;
            }
            if partner.f.abs_diff(anchor.f) > MAX_FREQ_DELTA {
                continue;
            }

            fingerprints.push(Fingerprint {
                hash: pair_hash(anchor.f, partner.f, dt),
                anchor_time: anchor.t,
            });
            emitted += 1;
            if emitted == FAN_OUT {
                break;
            }
        }
    }

    fingerprints
}
