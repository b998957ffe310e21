use std::collections::HashSet;

use serde::Deserialize;

use crate::{
    constants::{
        EMAIL_LENGTH, MAX_AMOUNT, MAX_COOKING_TIME, MIN_AMOUNT, MIN_COOKING_TIME,
        RECIPE_NAME_LENGTH, RESERVED_USERNAMES, USERNAME_LENGTH,
    },
    error::{Error, HtmlError},
    schema::{Id, Recipe},
};

/// Recipe payload as submitted by a client. Every field is optional here so that a
/// missing field is reported as a validation failure rather than a malformed body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeForm {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
    pub image: Option<String>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmountForm>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmountForm {
    pub id: Id,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// A recipe payload that passed validation and is ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    /// Newly uploaded image as a data URI; `None` keeps the stored one (updates only).
    pub image: Option<String>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

impl RecipeForm {
    /// Validates a payload for a new recipe; every field is required.
    pub fn validate(self) -> Result<RecipeDraft, Error> {
        self.validate_with(None)
    }

    /// Validates a payload replacing `current`. Tags and ingredients are still required
    /// because associations are always replaced as a whole; the other fields fall back
    /// to the stored values.
    pub fn validate_update(self, current: &Recipe) -> Result<RecipeDraft, Error> {
        self.validate_with(Some(current))
    }

    fn validate_with(self, current: Option<&Recipe>) -> Result<RecipeDraft, Error> {
        let tags = validate_tags(self.tags)?;
        let ingredients = validate_ingredients(self.ingredients)?;

        let image = match self.image {
            Some(image) if !image.trim().is_empty() => Some(image),
            _ if current.is_some() => None,
            _ => return Err(HtmlError::InvalidRequest.new("Add a photo of the recipe.")),
        };

        let name = match (self.name, current) {
            (Some(name), _) => name,
            (None, Some(current)) => current.name.to_owned(),
            (None, None) => return Err(HtmlError::InvalidRequest.new("Recipe name is required.")),
        };
        let name = name.trim().to_owned();
        if name.is_empty() {
            return Err(HtmlError::InvalidRequest.new("Recipe name must not be blank."));
        }
        if name.chars().count() > RECIPE_NAME_LENGTH {
            return Err(HtmlError::InvalidRequest.new(&format!(
                "Recipe name must be at most {RECIPE_NAME_LENGTH} characters."
            )));
        }

        let text = match (self.text, current) {
            (Some(text), _) => text,
            (None, Some(current)) => current.text.to_owned(),
            (None, None) => {
                return Err(HtmlError::InvalidRequest.new("Recipe description is required."))
            }
        };
        if text.trim().is_empty() {
            return Err(HtmlError::InvalidRequest.new("Recipe description must not be blank."));
        }

        let cooking_time = match (self.cooking_time, current) {
            (Some(cooking_time), _) => cooking_time,
            (None, Some(current)) => current.cooking_time.into(),
            (None, None) => return Err(HtmlError::InvalidRequest.new("Cooking time is required.")),
        };
        if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&cooking_time) {
            return Err(HtmlError::InvalidRequest.new(&format!(
                "Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME} minutes."
            )));
        }

        Ok(RecipeDraft {
            name,
            text,
            cooking_time: cooking_time as i32,
            image,
            tags,
            ingredients,
        })
    }
}

fn validate_tags(tags: Option<Vec<Id>>) -> Result<Vec<Id>, Error> {
    let tags = tags.unwrap_or_default();
    if tags.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Add at least one tag."));
    }

    let unique: HashSet<&Id> = tags.iter().collect();
    if unique.len() < tags.len() {
        return Err(HtmlError::InvalidRequest.new("Tags must not repeat."));
    }

    Ok(tags)
}

fn validate_ingredients(
    ingredients: Option<Vec<IngredientAmountForm>>,
) -> Result<Vec<IngredientAmount>, Error> {
    let ingredients = ingredients.unwrap_or_default();
    if ingredients.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Add at least one ingredient."));
    }

    let unique: HashSet<Id> = ingredients.iter().map(|i| i.id).collect();
    if unique.len() < ingredients.len() {
        return Err(HtmlError::InvalidRequest.new("Ingredients must not repeat."));
    }

    ingredients
        .into_iter()
        .map(|ingredient| {
            if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&ingredient.amount) {
                return Err(HtmlError::InvalidRequest.new(&format!(
                    "Ingredient amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}."
                )));
            }

            Ok(IngredientAmount {
                id: ingredient.id,
                amount: ingredient.amount as i32,
            })
        })
        .collect()
}

/// Registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn required(value: Option<String>, field: &str, max_length: usize) -> Result<String, Error> {
    let value = value.map(|v| v.trim().to_owned()).unwrap_or_default();
    if value.is_empty() {
        return Err(HtmlError::InvalidRequest.new(&format!("Field '{field}' is required.")));
    }
    if value.chars().count() > max_length {
        return Err(HtmlError::InvalidRequest.new(&format!(
            "Field '{field}' must be at most {max_length} characters."
        )));
    }

    Ok(value)
}

/// `^[\w.@+-]+$`
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl UserForm {
    pub fn validate(self) -> Result<UserDraft, Error> {
        let email = required(self.email, "email", EMAIL_LENGTH)?;
        if !is_valid_email(&email) {
            return Err(HtmlError::InvalidRequest.new("Enter a valid email address."));
        }

        let username = required(self.username, "username", USERNAME_LENGTH)?;
        if !is_valid_username(&username) {
            return Err(HtmlError::InvalidRequest.new(
                "Username may contain only letters, digits and @/./+/-/_ characters.",
            ));
        }
        if RESERVED_USERNAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(&username))
        {
            return Err(HtmlError::InvalidRequest.new(&format!(
                "Username '{username}' is not allowed."
            )));
        }

        let first_name = required(self.first_name, "first_name", USERNAME_LENGTH)?;
        let last_name = required(self.last_name, "last_name", USERNAME_LENGTH)?;

        let password = self.password.unwrap_or_default();
        if password.is_empty() {
            return Err(HtmlError::InvalidRequest.new("Field 'password' is required."));
        }

        Ok(UserDraft {
            email,
            username,
            first_name,
            last_name,
            password,
        })
    }
}
