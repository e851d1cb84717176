use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub), module(mailer_error))]
pub enum MailerError {
    #[snafu(display("git error: {source}"))]
    Git {
        source: GitError,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("diff error: {source}"))]
    Diff {
        source: DiffError,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display(
        "invalid revision range for {reference}: old and new revisions are both null"
    ))]
    InvalidRevisionRange {
        reference: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("unknown type of update to {reference} ({revision_type})"))]
    UnknownReferenceUpdate {
        reference: String,
        revision_type: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("config error: {message}"))]
    Config {
        message: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("mail transport error: {message}"))]
    Transport {
        message: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("IO error: {source}"))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub), module(git_error))]
pub enum GitError {
    #[snafu(display("git command failed: {message}"))]
    CommandFailed {
        message: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("unexpected git output for {revision}: {message}"))]
    UnexpectedOutput {
        revision: String,
        message: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("IO error: {source}"))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub), module(diff_error))]
pub enum DiffError {
    #[snafu(display("unexpected diff header format: {line}"))]
    MalformedHeader {
        line: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("unexpected extended header line: {line}"))]
    UnsupportedExtendedHeader {
        line: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    #[snafu(display("unsupported status line: {line}"))]
    UnsupportedStatusLine {
        line: String,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}

pub type Result<T, E = MailerError> = std::result::Result<T, E>;
