use std::fmt;

use thiserror::Error;

/// Errors raised while interpreting a server version probe.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("unsupported version format: {0}")]
    UnsupportedFormat(String),
}

/// A parsed Couchbase Server version.
///
/// The admin REST surface reports `implementationVersion` in the form
/// `5.0.1-5003-enterprise`; only the numeric release and the build number are
/// meaningful to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: Option<String>,
}

impl ServerVersion {
    /// Parse an `implementationVersion` string from `GET /pools`.
    pub fn parse(implementation_version: &str) -> Result<Self, VersionError> {
        let mut parts = implementation_version.split('-');
        let release = parts
            .next()
            .ok_or_else(|| VersionError::UnsupportedFormat(implementation_version.to_string()))?;
        let build = parts.next().map(str::to_string);

        let numbers: Vec<u32> = release
            .split('.')
            .map(|n| n.parse())
            .collect::<Result<_, _>>()
            .map_err(|_| VersionError::UnsupportedFormat(implementation_version.to_string()))?;
        let [major, minor, patch] = numbers[..] else {
            return Err(VersionError::UnsupportedFormat(
                implementation_version.to_string(),
            ));
        };

        Ok(Self {
            major,
            minor,
            patch,
            build,
        })
    }

    /// Render as `major.minor.patch` without the build number.
    pub fn release(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Render as `major.minor.patch-build` when the build is known.
    pub fn short(&self) -> String {
        match &self.build {
            Some(build) => format!("{}-{}", self.release(), build),
            None => self.release(),
        }
    }

    /// Compare against an expected version given either as `X.Y.Z` or as
    /// `X.Y.Z-build`. A bare release matches any build of that release.
    pub fn matches(&self, expected: &str) -> bool {
        match expected.split_once('-') {
            Some(_) => self.short() == expected,
            None => self.release() == expected,
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// How data-plane credentials are provisioned for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketAuthMode {
    /// Scoped RBAC user per bucket, servers 5.0 and later.
    Rbac,
    /// Bucket password + fixed proxy port embedded in the create request.
    LegacySasl,
}

/// Capabilities derived once from a version probe.
///
/// Version-gated behavior (bucket auth scheme) is selected here instead of
/// comparing version strings at each call site.
#[derive(Debug, Clone)]
pub struct ServerCapabilities {
    version: ServerVersion,
}

impl ServerCapabilities {
    pub fn from_version(version: ServerVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> &ServerVersion {
        &self.version
    }

    pub fn bucket_auth(&self) -> BucketAuthMode {
        if self.version.major >= 5 {
            BucketAuthMode::Rbac
        } else {
            BucketAuthMode::LegacySasl
        }
    }
}
