//! Named source models and shared model handles.
//!
//! Several datasets are bound to the *same* model: when the joint fit moves a
//! parameter, every dataset must see it. [`ModelHandle`] is that shared
//! ownership (`Rc<RefCell<_>>`); cloning the handle clones the reference, not
//! the model. Use [`ModelHandle::deep_clone`] for an independent copy.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::models::spectral::SpectralModel;

/// A named source with its spectral model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyModel {
    pub name: String,
    pub spectral: SpectralModel,
}

impl SkyModel {
    pub fn new(name: impl Into<String>, spectral: SpectralModel) -> Self {
        Self {
            name: name.into(),
            spectral,
        }
    }
}

/// Shared, mutable reference to a [`SkyModel`].
#[derive(Debug, Clone)]
pub struct ModelHandle(Rc<RefCell<SkyModel>>);

impl ModelHandle {
    pub fn new(model: SkyModel) -> Self {
        Self(Rc::new(RefCell::new(model)))
    }

    /// `true` if both handles point at the same model instance.
    pub fn ptr_eq(a: &ModelHandle, b: &ModelHandle) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn borrow(&self) -> Ref<'_, SkyModel> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, SkyModel> {
        self.0.borrow_mut()
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Value copy of the current model state.
    pub fn snapshot(&self) -> SkyModel {
        self.0.borrow().clone()
    }

    /// A new, independent handle initialised from the current state.
    pub fn deep_clone(&self) -> ModelHandle {
        ModelHandle::new(self.snapshot())
    }

    /// Number of holders of this model (datasets + local handles).
    pub fn holders(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}
