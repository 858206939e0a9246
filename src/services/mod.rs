pub mod channel_auth;
pub mod connector;
pub mod direct_line;
pub mod question_answering;
pub mod upstream;
