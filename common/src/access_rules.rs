use mongodb::bson::oid::ObjectId;

use crate::{
    auth::Auth,
    entities::issue::Issue,
    error::{self, AddCode},
};

pub trait AccessRules<Object, Subject> {
    fn get_access(&self, object: Object, subject: Subject) -> bool;
}

/// Report a new issue.
pub struct Create;

/// Read an issue through the reporter's own view.
pub struct Read;

/// Read any issue through the admin view.
pub struct ReadAny;

pub struct ChangeStatus;

pub struct EditNotes;

pub struct Delete;

/// List every issue and read dashboard statistics.
pub struct Triage;

impl<'a> AccessRules<&'a Auth, ()> for Create {
    fn get_access(&self, auth: &'a Auth, _: ()) -> bool {
        match auth {
            Auth::Admin(_) | Auth::Citizen(_) => true,
            Auth::None => false,
        }
    }
}

impl<'a, 'b> AccessRules<&'a Auth, &'b Issue<ObjectId>> for Read {
    fn get_access(&self, auth: &'a Auth, issue: &'b Issue<ObjectId>) -> bool {
        match auth {
            Auth::Admin(_) => true,
            Auth::Citizen(id) => issue.is_reported_by(id),
            Auth::None => false,
        }
    }
}

impl<'a> AccessRules<&'a Auth, ()> for ReadAny {
    fn get_access(&self, auth: &'a Auth, _: ()) -> bool {
        auth.full_access()
    }
}

impl<'a> AccessRules<&'a Auth, ()> for ChangeStatus {
    fn get_access(&self, auth: &'a Auth, _: ()) -> bool {
        auth.full_access()
    }
}

impl<'a> AccessRules<&'a Auth, ()> for EditNotes {
    fn get_access(&self, auth: &'a Auth, _: ()) -> bool {
        auth.full_access()
    }
}

impl<'a, 'b> AccessRules<&'a Auth, &'b Issue<ObjectId>> for Delete {
    fn get_access(&self, auth: &'a Auth, issue: &'b Issue<ObjectId>) -> bool {
        match auth {
            Auth::Admin(_) => true,
            Auth::Citizen(id) => issue.is_reported_by(id),
            Auth::None => false,
        }
    }
}

impl<'a> AccessRules<&'a Auth, ()> for Triage {
    fn get_access(&self, auth: &'a Auth, _: ()) -> bool {
        auth.full_access()
    }
}

/// Evaluates `rule` and maps a refusal to 401 for anonymous callers and 403 otherwise.
pub fn authorize<'a, R, S>(rule: R, auth: &'a Auth, subject: S, denied: &str) -> error::Result<()>
where
    R: AccessRules<&'a Auth, S>,
{
    if rule.get_access(auth, subject) {
        return Ok(());
    }

    if auth == &Auth::None {
        return Err(anyhow::anyhow!("Not authorized, no valid token").code(401));
    }

    Err(anyhow::anyhow!("{}", denied).code(403))
}
