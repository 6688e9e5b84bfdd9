#[macro_use]
extern crate error_chain;

pub mod api;
pub mod approval;
pub mod config;
pub mod context;
pub mod crd;
pub mod duration;
pub mod manager;
pub mod notify;
pub mod phase;
pub mod phases;
pub mod strategy;

#[cfg(test)]
mod testing;

pub mod errors {
    // Create the Error, ErrorKind, ResultExt, and Result types
    error_chain! {
        foreign_links {
            Io(std::io::Error);
            HttpRequest(reqwest::Error);
            Kube(kube::Error);
            Json(serde_json::Error);
            Yaml(serde_yaml::Error);
        }

        errors {
            UnsupportedTargetKind(kind: String) {
                description("unsupported scale target kind")
                display("unsupported scale target kind: '{}'", kind)
            }
            InvalidDuration(value: String) {
                description("invalid duration string")
                display("invalid duration '{}', expected <number><s|m|h|d|w>", value)
            }
            InvalidTransition(from: String, to: String) {
                description("state transition not allowed")
                display("transition {} -> {} is not allowed", from, to)
            }
            MissingIdentity(what: &'static str) {
                description("object is missing its identity")
                display("object has no {}", what)
            }
            NotAwaitingApproval(name: String, status: String) {
                description("resource is not in approvaling state")
                display("{} is in state '{}', not Approvaling", name, status)
            }
            MissingApprovalField(field: &'static str) {
                description("approval request field is required")
                display("{} is required", field)
            }
            UnknownDecision(value: String) {
                description("unknown approval decision")
                display("unknown approval decision '{}'", value)
            }
        }
    }

    impl Error {
        /// Errors the user has to fix in the AlertScale spec. Retrying
        /// the reconcile will not make them go away.
        pub fn is_configuration(&self) -> bool {
            matches!(
                self.kind(),
                ErrorKind::InvalidDuration(_) | ErrorKind::UnsupportedTargetKind(_)
            )
        }

        pub fn is_not_found(&self) -> bool {
            match self.kind() {
                ErrorKind::Kube(kube::Error::Api(resp)) => resp.code == 404,
                _ => false,
            }
        }
    }
}

/*
An AlertScale walks a workload through a single bounded scale-up:

  Pending -> Approvaling -> Approved -> Scaling -> Scaled -> Completed -> Archived
                         \-> Rejected -------------------------/
                                        Scaling -> Failed

- Pending records the target's replica count so Completed (and Failed) can put it back.
- Approvaling waits for either an approval annotation, the auto-approval flag, or the timeout.
  The approver only ever writes annotations; status is written by the controller alone.
- Every handler recomputes from live state, so being reconciled twice is harmless.
- Waiting is a requeue, never a sleep.
*/
