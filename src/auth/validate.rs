//! Input checks for the account endpoints. Every rule runs, so a response lists all bad fields.

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::dto::{LoginRequest, RegisterRequest, UpdateProfileRequest};
use crate::auth::repo_types::{ProfileChanges, Role};
use crate::error::{AppError, FieldError};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Default)]
struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    fn fail(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError::new(field, message));
    }

    fn email(&mut self, email: &str) {
        if !is_valid_email(email) {
            self.fail("email", "Please provide a valid email");
        }
    }

    fn password(&mut self, field: &str, password: &str) {
        if password.chars().count() < MIN_PASSWORD_LEN {
            self.fail(field, "Password must be at least 6 characters");
        }
    }

    fn name(&mut self, name: &str) {
        let len = name.chars().count();
        if !(2..=50).contains(&len) {
            self.fail("name", "Name must be between 2 and 50 characters");
        }
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize, message: &str) {
        if value.chars().count() > max {
            self.fail(field, message);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, AppError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Registration input after trimming and normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub company: Option<String>,
}

pub fn registration(req: RegisterRequest) -> Result<Registration, AppError> {
    let mut checks = Checks::default();
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    checks.name(&name);
    checks.email(&email);
    checks.password("password", &req.password);

    let role = match req.role.as_deref().map(str::trim) {
        None | Some("") => Role::JobSeeker,
        Some("jobseeker") => Role::JobSeeker,
        Some("employer") => Role::Employer,
        Some(_) => {
            checks.fail("role", "Role must be jobseeker or employer");
            Role::JobSeeker
        }
    };

    let company = req
        .company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(company) = &company {
        checks.max_len(
            "company",
            company,
            100,
            "Company name cannot exceed 100 characters",
        );
    }

    checks.finish(Registration {
        name,
        email,
        password: req.password,
        role,
        company: company.filter(|_| role == Role::Employer),
    })
}

pub fn login(req: LoginRequest) -> Result<(String, String), AppError> {
    let mut checks = Checks::default();
    let email = normalize_email(&req.email);
    checks.email(&email);
    if req.password.is_empty() {
        checks.fail("password", "Password is required");
    }
    checks.finish((email, req.password))
}

pub fn email(raw: &str) -> Result<String, AppError> {
    let mut checks = Checks::default();
    let email = normalize_email(raw);
    checks.email(&email);
    checks.finish(email)
}

pub fn new_password(field: &str, password: &str) -> Result<(), AppError> {
    let mut checks = Checks::default();
    checks.password(field, password);
    checks.finish(())
}

pub fn reset(token: &str, password: &str) -> Result<(), AppError> {
    let mut checks = Checks::default();
    if token.trim().is_empty() {
        checks.fail("token", "Reset token is required");
    }
    checks.password("password", password);
    checks.finish(())
}

pub fn profile_changes(req: UpdateProfileRequest) -> Result<ProfileChanges, AppError> {
    let mut checks = Checks::default();

    for field in req.rejected.keys() {
        checks.fail(field, "This field cannot be updated");
    }

    let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
    let changes = ProfileChanges {
        name: trim(req.name),
        bio: trim(req.bio),
        location: trim(req.location),
        skills: req.skills.map(|skills| {
            skills
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }),
        experience: trim(req.experience),
        education: trim(req.education),
    };

    if let Some(name) = &changes.name {
        checks.name(name);
    }
    if let Some(bio) = &changes.bio {
        checks.max_len("bio", bio, 500, "Bio cannot exceed 500 characters");
    }
    if let Some(location) = &changes.location {
        checks.max_len(
            "location",
            location,
            100,
            "Location cannot exceed 100 characters",
        );
    }
    if let Some(experience) = &changes.experience {
        checks.max_len(
            "experience",
            experience,
            1000,
            "Experience cannot exceed 1000 characters",
        );
    }
    if let Some(education) = &changes.education {
        checks.max_len(
            "education",
            education,
            500,
            "Education cannot exceed 500 characters",
        );
    }

    checks.finish(changes)
}
