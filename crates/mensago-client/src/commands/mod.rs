//! Protocol commands
//!
//! Each command takes the connection it runs on. Parameters are validated
//! before anything is sent, so a rejected call never produces traffic.

mod auth;
mod fs;
mod keycard;
mod registration;

pub use auth::{
    PasswordReset, cancel, device, devkey, login, logout, passcode, password, reset_password,
    setpassword,
};
pub use fs::{
    QuotaInfo, copy, delete, exists, getquotainfo, listdirs, listfiles, mkdir, move_file, rmdir,
};
pub use keycard::{MAX_KEYCARD_SIZE, addentry, getwid, iscurrent, orgcard, usercard};
pub use registration::{
    PreregInfo, RegistrationInfo, WorkspaceStatus, preregister, regcode, register, setstatus,
    unregister,
};
