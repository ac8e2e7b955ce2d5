//! Binding helper for the control socket: a filesystem path, or (Linux only)
//! an abstract socket name prefixed with `@`. Abstract sockets aren't yet
//! exposed by stable `std`, so the bind/listen pair is done directly with
//! `libc`.

use std::io;
use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixListener as StdUnixListener;

use crate::error::{Error, Result};

/// Resolve `spec` (a filesystem path, or `@name` for an abstract socket) into
/// a bound, listening, non-blocking `tokio` [`tokio::net::UnixListener`].
pub fn bind(spec: &str) -> Result<tokio::net::UnixListener> {
    let std_listener = if let Some(name) = spec.strip_prefix('@') {
        bind_abstract(name).map_err(|e| Error::SocketBindFailed(e.to_string()))?
    } else {
        StdUnixListener::bind(spec).map_err(|e| Error::SocketBindFailed(format!("{spec}: {e}")))?
    };
    std_listener.set_nonblocking(true).map_err(|e| Error::SocketBindFailed(e.to_string()))?;
    tokio::net::UnixListener::from_std(std_listener)
        .map_err(|e| Error::SocketBindFailed(e.to_string()).into())
}

#[cfg(target_os = "linux")]
fn bind_abstract(name: &str) -> io::Result<StdUnixListener> {
    unsafe {
        let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addr: libc::sockaddr_un = std::mem::zeroed();
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

        let name_bytes = name.as_bytes();
        if name_bytes.len() > addr.sun_path.len() - 1 {
            libc::close(fd);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "abstract socket name too long"));
        }
        // sun_path[0] is already zero from the zeroed struct: that leading
        // NUL is what marks this as an abstract-namespace address.
        for (i, byte) in name_bytes.iter().enumerate() {
            addr.sun_path[1 + i] = *byte as libc::c_char;
        }

        let len = std::mem::offset_of!(libc::sockaddr_un, sun_path) + 1 + name_bytes.len();
        let ret = libc::bind(
            fd,
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            len as libc::socklen_t,
        );
        if ret < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        let ret = libc::listen(fd, 128);
        if ret < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(StdUnixListener::from_raw_fd(fd))
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_abstract(_name: &str) -> io::Result<StdUnixListener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract unix sockets are only supported on Linux",
    ))
}

/// Connect to the control socket at `spec` (a filesystem path, or `@name`).
pub async fn connect(spec: &str) -> Result<tokio::net::UnixStream> {
    if let Some(name) = spec.strip_prefix('@') {
        let std_stream = connect_abstract(name).map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
        std_stream.set_nonblocking(true).map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
        tokio::net::UnixStream::from_std(std_stream).map_err(|e| Error::Other(anyhow::anyhow!(e)).into())
    } else {
        tokio::net::UnixStream::connect(spec)
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!(e)).into())
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> io::Result<std::os::unix::net::UnixStream> {
    unsafe {
        let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addr: libc::sockaddr_un = std::mem::zeroed();
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
        let name_bytes = name.as_bytes();
        for (i, byte) in name_bytes.iter().enumerate() {
            addr.sun_path[1 + i] = *byte as libc::c_char;
        }
        let len = std::mem::offset_of!(libc::sockaddr_un, sun_path) + 1 + name_bytes.len();

        let ret = libc::connect(
            fd,
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            len as libc::socklen_t,
        );
        if ret < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(std::os::unix::net::UnixStream::from_raw_fd(fd))
    }
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_name: &str) -> io::Result<std::os::unix::net::UnixStream> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "abstract unix sockets are only supported on Linux"))
}

/// Default control socket path for this platform, per §6.2.
pub fn default_path() -> String {
    if cfg!(target_os = "linux") {
        "@kube-porter.sock".to_string()
    } else {
        dirs::home_dir()
            .map(|home| home.join(".kube-porter.sock").to_string_lossy().into_owned())
            .unwrap_or_else(|| ".kube-porter.sock".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_abstract_on_linux() {
        if cfg!(target_os = "linux") {
            assert!(default_path().starts_with('@'));
        }
    }

    #[tokio::test]
    async fn binds_filesystem_path_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let listener = bind(path.to_str().unwrap()).unwrap();
        drop(listener);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn binds_abstract_socket() {
        let name = format!("@kube-porter-test-{}", std::process::id());
        let listener = bind(&name).unwrap();
        drop(listener);
    }
}
