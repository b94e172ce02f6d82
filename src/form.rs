//! Weak forms: expressions paired with the test functionals they are integrated against.
use crate::accessor::{CellAccessor, EvaluationFlags, IntegrationFlags};
use crate::error::FormError;
use crate::expression::{Expression, SlotRequirements};
use crate::test_function::TestFunction;
use crate::Real;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Add;

/// The kinds of integrals a form contributes to.
///
/// Only cell integrals are currently supported by the integrator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationKinds {
    pub cell: bool,
    pub face: bool,
    pub boundary: bool,
}

impl Default for IntegrationKinds {
    fn default() -> Self {
        Self::cell_only()
    }
}

impl IntegrationKinds {
    pub fn cell_only() -> Self {
        Self {
            cell: true,
            face: false,
            boundary: false,
        }
    }

    pub fn with_face(self, face: bool) -> Self {
        Self { face, ..self }
    }

    pub fn with_boundary(self, boundary: bool) -> Self {
        Self { boundary, ..self }
    }

    /// Returns an error if the kinds cannot be integrated by a cell loop.
    pub fn validate(&self) -> Result<(), FormError> {
        if self.face {
            Err(FormError::unsupported("face integrals are not supported"))
        } else if self.boundary {
            Err(FormError::unsupported("boundary integrals are not supported"))
        } else if !self.cell {
            Err(FormError::unsupported("a form must contribute at least cell integrals"))
        } else {
            Ok(())
        }
    }
}

/// A single term `(test, expression)` of a weak form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormTerm<T: Real> {
    test: TestFunction,
    expression: Expression<T>,
}

impl<T: Real> FormTerm<T> {
    pub fn new(test: TestFunction, expression: Expression<T>) -> Result<Self, FormError> {
        if test.shape().compatible(expression.shape()) {
            Ok(Self { test, expression })
        } else {
            Err(FormError::ShapeMismatch {
                left: *test.shape(),
                right: Some(*expression.shape()),
                operation: "form term",
            })
        }
    }

    pub fn test(&self) -> &TestFunction {
        &self.test
    }

    pub fn expression(&self) -> &Expression<T> {
        &self.expression
    }

    pub fn into_form(self) -> Form<T> {
        Form {
            terms: vec![self],
            kinds: IntegrationKinds::default(),
        }
    }
}

/// A weak form: a non-empty sum of terms, together with the kinds of integrals it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Form<T: Real> {
    terms: Vec<FormTerm<T>>,
    kinds: IntegrationKinds,
}

impl<T: Real> Form<T> {
    pub fn new(terms: Vec<FormTerm<T>>) -> Result<Self, FormError> {
        if terms.is_empty() {
            return Err(FormError::InternalConsistency("a form needs at least one term".to_string()));
        }
        Ok(Self {
            terms,
            kinds: IntegrationKinds::default(),
        })
    }

    pub fn with_integration_kinds(self, kinds: IntegrationKinds) -> Self {
        Self { kinds, ..self }
    }

    pub fn integration_kinds(&self) -> &IntegrationKinds {
        &self.kinds
    }

    pub fn terms(&self) -> &[FormTerm<T>] {
        &self.terms
    }

    pub fn push(&mut self, term: FormTerm<T>) {
        self.terms.push(term);
    }

    /// The slots referenced by any test or field functional of the form.
    pub fn slots(&self) -> BTreeSet<usize> {
        self.terms
            .iter()
            .flat_map(|term| {
                std::iter::once(term.test.slot()).chain(term.expression.fields().into_iter().map(|f| f.slot()))
            })
            .collect()
    }

    pub fn n_fields(&self) -> usize {
        self.slots().len()
    }

    /// Checks the form against the slots and bases the accessor provides.
    pub fn validate<A>(&self, accessor: &A) -> Result<(), FormError>
    where
        A: ?Sized + CellAccessor<T>,
    {
        self.kinds.validate()?;
        for term in &self.terms {
            term.test.validate(accessor)?;
            for field in term.expression.fields() {
                field.validate(accessor)?;
            }
        }
        Ok(())
    }

    /// The union of all evaluation flags required by the form, per slot.
    pub fn evaluation_flags(&self) -> SlotRequirements {
        let mut flags = SlotRequirements::new();
        for term in &self.terms {
            for (slot, required) in term.expression.requirements() {
                *flags.entry(slot).or_default() |= required;
            }
        }
        flags
    }

    /// The union of all integration flags required by the test functionals, per slot.
    pub fn integration_flags(&self) -> BTreeMap<usize, IntegrationFlags> {
        let mut flags = BTreeMap::new();
        for term in &self.terms {
            *flags.entry(term.test.slot()).or_insert(IntegrationFlags::NONE) |= term.test.integration_flags();
        }
        flags
    }

    /// Configures the evaluation flags of every accessor slot.
    ///
    /// Slots not referenced by any field functional are not evaluated at all.
    pub fn set_evaluation_flags<A>(&self, accessor: &mut A)
    where
        A: ?Sized + CellAccessor<T>,
    {
        let flags = self.evaluation_flags();
        for slot in 0..accessor.n_slots() {
            let slot_flags = flags.get(&slot).copied().unwrap_or(EvaluationFlags::NONE);
            accessor.set_evaluation_flags(slot, slot_flags);
        }
    }

    pub fn set_integration_flags<A>(&self, accessor: &mut A)
    where
        A: ?Sized + CellAccessor<T>,
    {
        let flags = self.integration_flags();
        for slot in 0..accessor.n_slots() {
            let slot_flags = flags.get(&slot).copied().unwrap_or(IntegrationFlags::NONE);
            accessor.set_integration_flags(slot, slot_flags);
        }
    }

    /// Evaluates every term at quadrature point `q` and submits the result through its test
    /// functional.
    pub fn evaluate<A>(&self, accessor: &mut A, q: usize) -> eyre::Result<()>
    where
        A: ?Sized + CellAccessor<T>,
    {
        for term in &self.terms {
            let value = term.expression.value(accessor, q)?;
            term.test.submit(accessor, q, &value)?;
        }
        Ok(())
    }
}

impl<T: Real> Add for FormTerm<T> {
    type Output = Form<T>;

    fn add(self, rhs: FormTerm<T>) -> Self::Output {
        let mut form = self.into_form();
        form.push(rhs);
        form
    }
}

impl<T: Real> Add<FormTerm<T>> for Form<T> {
    type Output = Form<T>;

    fn add(mut self, rhs: FormTerm<T>) -> Self::Output {
        self.push(rhs);
        self
    }
}

impl<T: Real> From<FormTerm<T>> for Form<T> {
    fn from(term: FormTerm<T>) -> Self {
        term.into_form()
    }
}
