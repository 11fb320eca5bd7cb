use crate::jvm::class_graph::{ClassGraph, ClassId};
use crate::jvm::{ArrayType, BinaryName, RefType, ResolutionError};
use crate::util::RefId;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// Classes are only ever assignable to their superclasses, so interfaces are only searched when
/// the target is itself an interface.
impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        if !super_type.is_interface() {
            // Everything (interfaces included) is assignable to `java/lang/Object`
            return super_type.superclass.is_none() || self.0.is_subclass_of(super_type.0);
        }

        let mut pending: Vec<ClassId<'g>> = vec![*self];
        let mut visited: HashSet<ClassId<'g>> = HashSet::new();
        while let Some(class) = pending.pop() {
            if class == *super_type {
                return true;
            }
            if visited.insert(class) {
                let class: &'g _ = class.0;
                pending.extend(class.superclass);
                pending.extend(class.interfaces.iter().map(RefId));
            }
        }
        false
    }
}

/// Java assignability for reference types, in the sense of `isJavaAssignable` from the JVMS
/// verification rules. Arrays are covariant in their element type.
impl<'g> Assignable for RefType<ClassId<'g>> {
    fn is_assignable(&self, super_type: &RefType<ClassId<'g>>) -> bool {
        match super_type {
            RefType::Object(target) => match self {
                RefType::Object(class) => class.is_assignable(target),
                RefType::PrimitiveArray(_) | RefType::ObjectArray(_) => {
                    is_array_supertype(&target.name)
                }
            },

            // Primitive arrays must match in dimension and type
            RefType::PrimitiveArray(target) => match self {
                RefType::PrimitiveArray(array) => array == target,
                _ => false,
            },

            RefType::ObjectArray(target) => {
                let array_dimensions = match self {
                    RefType::Object(_) => return false,
                    RefType::PrimitiveArray(array) => array.additional_dimensions,
                    RefType::ObjectArray(array) => array.additional_dimensions,
                };
                match array_dimensions.cmp(&target.additional_dimensions) {
                    Ordering::Less => false,

                    // Either a mismatched primitive, or element type covariance
                    Ordering::Equal => match self {
                        RefType::ObjectArray(array) => {
                            array.element_type.is_assignable(&target.element_type)
                        }
                        _ => false,
                    },

                    // The extra dimensions make the element an array, which then needs to fit in
                    // the target's element type
                    Ordering::Greater => is_array_supertype(&target.element_type.name),
                }
            }
        }
    }
}

/// Arrays extend `java/lang/Object` and implement exactly `Cloneable` and `Serializable`
fn is_array_supertype(super_type: &BinaryName) -> bool {
    [BinaryName::OBJECT, BinaryName::CLONEABLE, BinaryName::SERIALIZABLE].contains(super_type)
}

impl<'g> ClassGraph<'g> {
    /// Query if one named type is assignable to another
    ///
    /// Fails if any class involved can't be resolved.
    pub fn is_assignable(
        &self,
        sub_type: &RefType<BinaryName>,
        super_type: &RefType<BinaryName>,
    ) -> Result<bool, ResolutionError> {
        if sub_type == super_type {
            return Ok(true);
        }
        let sub_type = self.resolve_ref_type(sub_type)?;
        let super_type = self.resolve_ref_type(super_type)?;
        Ok(sub_type.is_assignable(&super_type))
    }

    /// Find the first common superclass of two reference types
    ///
    /// This is what the verifier uses when two control flow paths meet with different reference
    /// types in the same slot. It is not a least upper bound: as soon as an interface or a mix of
    /// array and non-array types is involved, the answer is `java/lang/Object`. Equal-dimension
    /// object arrays take the common superclass of their element types.
    pub fn first_common_superclass(
        &self,
        type1: &RefType<BinaryName>,
        type2: &RefType<BinaryName>,
    ) -> Result<RefType<BinaryName>, ResolutionError> {
        if type1 == type2 {
            return Ok(type1.clone());
        }

        match (type1, type2) {
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
                if arr1.additional_dimensions == arr2.additional_dimensions =>
            {
                let element_type = self
                    .first_common_superclass_of_classes(&arr1.element_type, &arr2.element_type)?;
                Ok(RefType::ObjectArray(ArrayType {
                    additional_dimensions: arr1.additional_dimensions,
                    element_type,
                }))
            }
            (RefType::Object(class1), RefType::Object(class2)) => Ok(RefType::Object(
                self.first_common_superclass_of_classes(class1, class2)?,
            )),
            _ => {
                // Still make sure everything mentioned exists
                self.resolve_ref_type(type1)?;
                self.resolve_ref_type(type2)?;
                Ok(RefType::Object(BinaryName::OBJECT))
            }
        }
    }

    fn first_common_superclass_of_classes(
        &self,
        class1: &BinaryName,
        class2: &BinaryName,
    ) -> Result<BinaryName, ResolutionError> {
        let class1 = self.resolve(class1)?;
        let class2 = self.resolve(class2)?;
        if class1.is_interface() || class2.is_interface() {
            return Ok(BinaryName::OBJECT);
        }

        let chain1 = class1.0.superclass_chain();
        for class in class2.0.superclass_chain() {
            if chain1.iter().any(|other| std::ptr::eq(*other, class)) {
                return Ok(class.name.clone());
            }
        }

        // Only possible if the superclass chains don't both end in the same `java/lang/Object`
        Ok(BinaryName::OBJECT)
    }
}
