//! Deterministic registration fingerprints used as plan cache keys.
#![allow(clippy::cast_possible_truncation)]

use crate::{
    db::query::plan::{LockMode, Projection, QueryHints, ResultShape},
    model::EntityModel,
};
use sha2::{Digest, Sha256};

///
/// PlanFingerprint
///
/// Stable, deterministic fingerprint of everything that shapes a compiled plan.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl std::fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

///
/// FingerprintInput
///
/// Registration-time inputs hashed into the cache key. Declared templates are
/// already resolved (explicit or named) before hashing. The whole entity model
/// is hashed, so repositories sharing a cache only share plans compiled
/// against the same schema.
///

pub(crate) struct FingerprintInput<'a> {
    pub model: &'a EntityModel,
    pub signature: &'a str,
    pub template: Option<&'a str>,
    pub count_template: Option<&'a str>,
    pub params: &'a [String],
    pub shape: ResultShape,
    pub projection: &'a Projection,
    pub hints: &'a QueryHints,
    pub lock: LockMode,
    pub entity_graph: &'a [String],
}

impl FingerprintInput<'_> {
    pub(crate) fn fingerprint(&self) -> PlanFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"planfp:v1");

        write_tag(&mut hasher, 0x01);
        hash_model(&mut hasher, self.model);
        write_str(&mut hasher, self.signature);

        write_tag(&mut hasher, 0x02);
        write_opt_str(&mut hasher, self.template);
        write_opt_str(&mut hasher, self.count_template);

        write_tag(&mut hasher, 0x03);
        write_u32(&mut hasher, self.params.len() as u32);
        for param in self.params {
            write_str(&mut hasher, param);
        }

        write_tag(&mut hasher, 0x04);
        write_tag(&mut hasher, self.shape.tag());
        hash_projection(&mut hasher, self.projection);

        write_tag(&mut hasher, 0x05);
        write_tag(&mut hasher, u8::from(self.hints.read_only));
        match self.hints.timeout_ms {
            Some(ms) => {
                write_tag(&mut hasher, 1);
                hasher.update(ms.to_be_bytes());
            }
            None => write_tag(&mut hasher, 0),
        }
        write_opt_str(&mut hasher, self.hints.comment.as_deref());
        write_tag(&mut hasher, self.lock.tag());

        write_tag(&mut hasher, 0x06);
        write_u32(&mut hasher, self.entity_graph.len() as u32);
        for path in self.entity_graph {
            write_str(&mut hasher, path);
        }

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        PlanFingerprint(out)
    }
}

fn hash_model(hasher: &mut Sha256, model: &EntityModel) {
    write_str(hasher, model.name());
    write_str(hasher, model.primary_key());

    write_u32(hasher, model.fields().len() as u32);
    for field in model.fields() {
        write_str(hasher, field);
    }

    write_u32(hasher, model.relations().len() as u32);
    for relation in model.relations() {
        write_str(hasher, &relation.name);
        write_str(hasher, &relation.foreign_key);
        write_str(hasher, &relation.target);
        write_str(hasher, &relation.target_key);
    }
}

fn hash_projection(hasher: &mut Sha256, projection: &Projection) {
    match projection {
        Projection::Entity => write_tag(hasher, 0x10),
        Projection::Scalar(field) => {
            write_tag(hasher, 0x11);
            write_str(hasher, field);
        }
        Projection::Dto(fields) => {
            write_tag(hasher, 0x12);
            write_u32(hasher, fields.len() as u32);
            for field in fields {
                write_str(hasher, field);
            }
        }
    }
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_opt_str(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            write_tag(hasher, 1);
            write_str(hasher, value);
        }
        None => write_tag(hasher, 0),
    }
}
