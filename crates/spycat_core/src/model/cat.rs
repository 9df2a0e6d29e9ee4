//! Cat domain model.
//!
//! # Responsibility
//! - Define the agent record eligible for mission assignment.
//! - Validate creation and salary-update inputs before persistence.
//!
//! # Invariants
//! - `years_of_experience >= 0` and `salary >= 0`.
//! - `breed` is checked against the breed directory at creation time only.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned cat identity.
pub type CatId = i64;

/// Persisted cat agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cat {
    pub id: CatId,
    pub name: String,
    pub breed: String,
    pub years_of_experience: i32,
    pub salary: i32,
}

/// Input for cat creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCat {
    pub name: String,
    pub breed: String,
    pub years_of_experience: i32,
    pub salary: i32,
}

/// Input validation failures for cat writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatValidationError {
    EmptyName,
    EmptyBreed,
    NegativeExperience(i32),
    NegativeSalary(i32),
}

impl Display for CatValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "cat name must not be blank"),
            Self::EmptyBreed => write!(f, "cat breed must not be blank"),
            Self::NegativeExperience(value) => write!(
                f,
                "years of experience must be greater than or equal to 0, got {value}"
            ),
            Self::NegativeSalary(value) => write!(
                f,
                "salary must be greater than or equal to 0, got {value}"
            ),
        }
    }
}

impl Error for CatValidationError {}

impl NewCat {
    /// Checks field-level constraints. Breed recognition is a separate,
    /// remote check performed by the breed gate.
    pub fn validate(&self) -> Result<(), CatValidationError> {
        if self.name.trim().is_empty() {
            return Err(CatValidationError::EmptyName);
        }
        if self.breed.trim().is_empty() {
            return Err(CatValidationError::EmptyBreed);
        }
        if self.years_of_experience < 0 {
            return Err(CatValidationError::NegativeExperience(
                self.years_of_experience,
            ));
        }
        validate_salary(self.salary)
    }
}

/// Salary is the only mutable cat attribute.
pub fn validate_salary(salary: i32) -> Result<(), CatValidationError> {
    if salary < 0 {
        return Err(CatValidationError::NegativeSalary(salary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_salary, CatValidationError, NewCat};

    fn new_cat() -> NewCat {
        NewCat {
            name: "Tom".to_string(),
            breed: "Abyssinian".to_string(),
            years_of_experience: 3,
            salary: 1200,
        }
    }

    #[test]
    fn valid_cat_passes() {
        assert!(new_cat().validate().is_ok());
    }

    #[test]
    fn blank_name_and_breed_are_rejected() {
        let mut cat = new_cat();
        cat.name = "   ".to_string();
        assert_eq!(cat.validate(), Err(CatValidationError::EmptyName));

        let mut cat = new_cat();
        cat.breed = String::new();
        assert_eq!(cat.validate(), Err(CatValidationError::EmptyBreed));
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let mut cat = new_cat();
        cat.years_of_experience = -1;
        assert_eq!(cat.validate(), Err(CatValidationError::NegativeExperience(-1)));

        assert_eq!(validate_salary(-5), Err(CatValidationError::NegativeSalary(-5)));
        assert!(validate_salary(0).is_ok());
    }
}
