//! Server-side filesystem commands

use mensago_common::RandomId;

use crate::conn::{ClientRequest, ServerConnection};
use crate::error::{ClientError, Result};

fn require_path(name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(ClientError::bad_value(format!("{} may not be empty", name)));
    }
    Ok(())
}

/// Copies a file into a directory and returns the name of the copy
pub async fn copy(conn: &mut ServerConnection, src: &str, destdir: &str) -> Result<String> {
    require_path("source file", src)?;
    require_path("destination", destdir)?;

    let request = ClientRequest::new("COPY")
        .with("SourceFile", src)
        .with("DestDir", destdir);
    let response = conn.request(&request).await?.expect(200)?;
    Ok(response.require("NewName")?.to_string())
}

pub async fn delete(conn: &mut ServerConnection, path: &str) -> Result<()> {
    require_path("path", path)?;

    let request = ClientRequest::new("DELETE").with("Path", path);
    conn.request(&request).await?.expect(200)?;
    Ok(())
}

/// Checks whether a path exists on the server. An empty path never exists.
pub async fn exists(conn: &mut ServerConnection, path: &str) -> Result<bool> {
    if path.trim().is_empty() {
        return Ok(false);
    }

    let request = ClientRequest::new("EXISTS").with("Path", path);
    let response = conn.request(&request).await?;
    match response.code {
        200 => Ok(true),
        404 => Ok(false),
        _ => Err(response.into_error()),
    }
}

/// Disk usage and quota, in bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaInfo {
    pub usage: u64,
    pub quota: u64,
}

/// Gets disk usage for the current workspace. Administrators may name
/// another workspace.
pub async fn getquotainfo(conn: &mut ServerConnection, wid: Option<&RandomId>) -> Result<QuotaInfo> {
    let mut request = ClientRequest::new("GETQUOTAINFO");
    if let Some(wid) = wid {
        request.set("Workspace-ID", wid.as_str());
    }

    let response = conn.request(&request).await?.expect(200)?;
    Ok(QuotaInfo {
        usage: response.require_u64("DiskUsage")?,
        quota: response.require_u64("QuotaSize")?,
    })
}

/// Lists the files in the current directory, optionally only those
/// created after a Unix time
pub async fn listfiles(conn: &mut ServerConnection, since: Option<i64>) -> Result<Vec<String>> {
    let mut request = ClientRequest::new("LIST");
    if let Some(time) = since.filter(|t| *t > 0) {
        request.set("Time", time.to_string());
    }

    let response = conn.request(&request).await?.expect(200)?;
    response.require_list("Files")
}

pub async fn listdirs(conn: &mut ServerConnection) -> Result<Vec<String>> {
    let response = conn.request(&ClientRequest::new("LISTDIRS")).await?.expect(200)?;
    response.require_list("Directories")
}

/// Creates a directory and any missing parents
pub async fn mkdir(conn: &mut ServerConnection, path: &str) -> Result<()> {
    require_path("path", path)?;

    let request = ClientRequest::new("MKDIR").with("Path", path);
    conn.request(&request).await?.expect(200)?;
    Ok(())
}

pub async fn move_file(conn: &mut ServerConnection, src: &str, destdir: &str) -> Result<()> {
    require_path("source file", src)?;
    require_path("destination", destdir)?;

    let request = ClientRequest::new("MOVE")
        .with("SourceFile", src)
        .with("DestDir", destdir);
    conn.request(&request).await?.expect(200)?;
    Ok(())
}

/// Removes a directory. A recursive removal also deletes its contents.
pub async fn rmdir(conn: &mut ServerConnection, path: &str, recursive: bool) -> Result<()> {
    require_path("path", path)?;

    let mut request = ClientRequest::new("RMDIR").with("Path", path);
    if recursive {
        request.set("Recursive", "True");
    }
    conn.request(&request).await?.expect(200)?;
    Ok(())
}
