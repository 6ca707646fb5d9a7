//! Bridge loaders.

use super::{LoadContext, LoadOutcome, Loader, Tier};
use crate::error::EngineResult;
use crate::resolver::{Dimension, KeyMap};
use crate::schema::{self, source};
use crate::upsert::insert_if_absent;
use starsync_store::{Row, TableDef};
use time::PrimitiveDateTime;

/// Loads a many-to-many link table between two dimensions.
///
/// Bridges carry no timestamp: every run reads the whole source link table
/// and inserts the links that are missing. Existing links are never
/// modified; a link whose endpoint is not loaded is skipped.
#[derive(Debug, Clone)]
pub struct BridgeLoader {
    table: &'static str,
    source_table: &'static str,
    left: Dimension,
    right: Dimension,
    definition: fn() -> TableDef,
}

impl BridgeLoader {
    /// `film_actor` into `bridge_film_actor`.
    pub fn film_actor() -> Self {
        Self {
            table: schema::BRIDGE_FILM_ACTOR,
            source_table: source::FILM_ACTOR,
            left: Dimension::Film,
            right: Dimension::Actor,
            definition: schema::bridge_film_actor,
        }
    }

    /// `film_category` into `bridge_film_category`.
    pub fn film_category() -> Self {
        Self {
            table: schema::BRIDGE_FILM_CATEGORY,
            source_table: source::FILM_CATEGORY,
            left: Dimension::Film,
            right: Dimension::Category,
            definition: schema::bridge_film_category,
        }
    }
}

impl Loader for BridgeLoader {
    fn table(&self) -> &'static str {
        self.table
    }

    fn tier(&self) -> Tier {
        Tier::Bridge
    }

    fn watermark_field(&self) -> Option<&'static str> {
        None
    }

    fn load(&self, ctx: &mut LoadContext<'_>, _since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let links = ctx.source.find(self.source_table, None)?;
        let left_keys = KeyMap::load(ctx.target, self.left)?;
        let right_keys = KeyMap::load(ctx.target, self.right)?;
        let def = (self.definition)();

        let mut outcome = LoadOutcome {
            read: links.len() as u64,
            ..LoadOutcome::default()
        };

        for link in &links {
            let left = left_keys.lookup(link.opt_i64(self.left.natural_key())?);
            let right = right_keys.lookup(link.opt_i64(self.right.natural_key())?);
            let (Some(left), Some(right)) = (left, right) else {
                tracing::debug!(table = self.table, ?left, ?right, "skipping link: endpoint not loaded");
                outcome.skipped += 1;
                continue;
            };
            let identity = Row::new()
                .with(self.left.surrogate_key(), left)
                .with(self.right.surrogate_key(), right);
            if insert_if_absent(ctx.target, &def, identity)? {
                outcome.written += 1;
            } else {
                outcome.unchanged += 1;
            }
        }

        Ok(outcome)
    }
}
