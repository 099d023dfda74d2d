use crate::foundation::error::StippleResult;
use crate::property::clip::{ClipId, ClipState};
use crate::property::effect::{EffectId, EffectState};
use crate::property::scroll::{ScrollId, ScrollState};
use crate::property::transform::{TransformId, TransformState};
use crate::property::tree::{PaintPropertyChangeType, PropertyTree};

/// The (transform, clip, effect) triple every paint chunk is painted under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyTreeState {
    pub transform: TransformId,
    pub clip: ClipId,
    pub effect: EffectId,
}

impl PropertyTreeState {
    pub fn new(transform: TransformId, clip: ClipId, effect: EffectId) -> Self {
        Self {
            transform,
            clip,
            effect,
        }
    }

    /// Fails with [`crate::StippleError::PropertyTree`] if any handle is stale.
    pub fn check(&self, trees: &PropertyTrees) -> StippleResult<()> {
        trees.transforms.try_state(self.transform)?;
        trees.clips.try_state(self.clip)?;
        trees.effects.try_state(self.effect)?;
        Ok(())
    }

    /// Resolves aliases on all three nodes.
    pub fn unalias(self, trees: &PropertyTrees) -> Self {
        Self {
            transform: trees.transforms.unalias(self.transform),
            clip: trees.clips.unalias(self.clip),
            effect: trees.effects.unalias(self.effect),
        }
    }

    /// Maximum change of any node between this state and `ancestor`, per tree.
    pub fn changed(&self, trees: &PropertyTrees, ancestor: &Self) -> PaintPropertyChangeType {
        trees
            .transforms
            .changed(self.transform, ancestor.transform)
            .max(trees.clips.changed(self.clip, ancestor.clip))
            .max(trees.effects.changed(self.effect, ancestor.effect))
    }
}

/// Alias node to re-point in [`PropertyTrees::update_alias`].
#[derive(Clone, Copy, Debug)]
pub enum AliasTarget {
    Transform { id: TransformId, parent: TransformId },
    Clip { id: ClipId, parent: ClipId },
    Effect { id: EffectId, parent: EffectId },
}

/// The four paint property trees plus the geometry cache generation.
///
/// Every structural or state change bumps `cache_generation`, which lazily invalidates all
/// memoized geometry: a node's cache entry is trusted only while its recorded generation
/// equals the current one. Mutation goes through this type so the counter cannot be skipped.
/// The counter is session-scoped and not synchronized; the trees are mutated and read on a
/// single paint thread.
#[derive(Debug)]
pub struct PropertyTrees {
    transforms: PropertyTree<TransformState>,
    clips: PropertyTree<ClipState>,
    effects: PropertyTree<EffectState>,
    scrolls: PropertyTree<ScrollState>,
    cache_generation: u64,
}

impl Default for PropertyTrees {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTrees {
    pub fn new() -> Self {
        let transforms = PropertyTree::new(TransformState::default());
        let root_transform = transforms.root();
        let clips = PropertyTree::new(ClipState::infinite(root_transform));
        let effects = PropertyTree::new(EffectState::new(root_transform));
        let scrolls = PropertyTree::new(ScrollState::default());
        Self {
            transforms,
            clips,
            effects,
            scrolls,
            cache_generation: 1,
        }
    }

    /// The state made of the three roots.
    pub fn root_state(&self) -> PropertyTreeState {
        PropertyTreeState::new(
            self.transforms.root(),
            self.clips.root(),
            self.effects.root(),
        )
    }

    pub fn transforms(&self) -> &PropertyTree<TransformState> {
        &self.transforms
    }

    pub fn clips(&self) -> &PropertyTree<ClipState> {
        &self.clips
    }

    pub fn effects(&self) -> &PropertyTree<EffectState> {
        &self.effects
    }

    pub fn scrolls(&self) -> &PropertyTree<ScrollState> {
        &self.scrolls
    }

    pub fn cache_generation(&self) -> u64 {
        self.cache_generation
    }

    /// Forces every memoized geometry entry to be recomputed on next read.
    pub fn invalidate_geometry_caches(&mut self) {
        self.cache_generation += 1;
    }

    fn note(&mut self, change: PaintPropertyChangeType) -> PaintPropertyChangeType {
        if change != PaintPropertyChangeType::Unchanged {
            self.invalidate_geometry_caches();
        }
        change
    }

    pub fn create_transform(
        &mut self,
        parent: TransformId,
        state: TransformState,
    ) -> StippleResult<TransformId> {
        let id = self.transforms.create(parent, state)?;
        self.invalidate_geometry_caches();
        Ok(id)
    }

    pub fn create_clip(&mut self, parent: ClipId, state: ClipState) -> StippleResult<ClipId> {
        let id = self.clips.create(parent, state)?;
        self.invalidate_geometry_caches();
        Ok(id)
    }

    pub fn create_effect(
        &mut self,
        parent: EffectId,
        state: EffectState,
    ) -> StippleResult<EffectId> {
        let id = self.effects.create(parent, state)?;
        self.invalidate_geometry_caches();
        Ok(id)
    }

    pub fn create_transform_alias(&mut self, parent: TransformId) -> StippleResult<TransformId> {
        let id = self.transforms.create_alias(parent)?;
        self.invalidate_geometry_caches();
        Ok(id)
    }

    pub fn create_clip_alias(&mut self, parent: ClipId) -> StippleResult<ClipId> {
        let id = self.clips.create_alias(parent)?;
        self.invalidate_geometry_caches();
        Ok(id)
    }

    pub fn create_effect_alias(&mut self, parent: EffectId) -> StippleResult<EffectId> {
        let id = self.effects.create_alias(parent)?;
        self.invalidate_geometry_caches();
        Ok(id)
    }

    pub fn create_scroll(
        &mut self,
        parent: ScrollId,
        state: ScrollState,
    ) -> StippleResult<ScrollId> {
        self.scrolls.create(parent, state)
    }

    pub fn update_transform(
        &mut self,
        id: TransformId,
        parent: TransformId,
        state: TransformState,
    ) -> StippleResult<PaintPropertyChangeType> {
        let change = self.transforms.update(id, parent, state)?;
        Ok(self.note(change))
    }

    pub fn update_clip(
        &mut self,
        id: ClipId,
        parent: ClipId,
        state: ClipState,
    ) -> StippleResult<PaintPropertyChangeType> {
        let change = self.clips.update(id, parent, state)?;
        Ok(self.note(change))
    }

    pub fn update_effect(
        &mut self,
        id: EffectId,
        parent: EffectId,
        state: EffectState,
    ) -> StippleResult<PaintPropertyChangeType> {
        let change = self.effects.update(id, parent, state)?;
        Ok(self.note(change))
    }

    pub fn update_scroll(
        &mut self,
        id: ScrollId,
        parent: ScrollId,
        state: ScrollState,
    ) -> StippleResult<PaintPropertyChangeType> {
        self.scrolls.update(id, parent, state)
    }

    /// Re-points an alias node; `which` selects the tree.
    pub fn update_alias(&mut self, which: AliasTarget) -> StippleResult<PaintPropertyChangeType> {
        let change = match which {
            AliasTarget::Transform { id, parent } => self.transforms.update_alias(id, parent)?,
            AliasTarget::Clip { id, parent } => self.clips.update_alias(id, parent)?,
            AliasTarget::Effect { id, parent } => self.effects.update_alias(id, parent)?,
        };
        Ok(self.note(change))
    }

    pub fn destroy_transform(&mut self, id: TransformId) -> StippleResult<()> {
        self.transforms.destroy(id)?;
        self.invalidate_geometry_caches();
        Ok(())
    }

    pub fn destroy_clip(&mut self, id: ClipId) -> StippleResult<()> {
        self.clips.destroy(id)?;
        self.invalidate_geometry_caches();
        Ok(())
    }

    pub fn destroy_effect(&mut self, id: EffectId) -> StippleResult<()> {
        self.effects.destroy(id)?;
        self.invalidate_geometry_caches();
        Ok(())
    }

    /// Clears changed flags on all four trees once every consumer has reacted.
    pub fn clear_all_changed(&mut self) {
        self.transforms.clear_all_changed();
        self.clips.clear_all_changed();
        self.effects.clear_all_changed();
        self.scrolls.clear_all_changed();
    }

    /// Clears changed flags from `state` up to `ancestor` in each tree.
    pub fn clear_changed_to(&mut self, state: &PropertyTreeState, ancestor: &PropertyTreeState) {
        self.transforms
            .clear_changed_to(state.transform, ancestor.transform);
        self.clips.clear_changed_to(state.clip, ancestor.clip);
        self.effects.clear_changed_to(state.effect, ancestor.effect);
    }

    /// Structural validation of all four trees.
    pub fn validate(&self) -> StippleResult<()> {
        self.transforms.validate()?;
        self.clips.validate()?;
        self.effects.validate()?;
        self.scrolls.validate()
    }
}
