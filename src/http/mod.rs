//! Wire-level HTTP/1.1 types shared by the transport and the dispatcher:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`] and [`Response`].

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::{BodyStream, Payload, Response};

/// Declares [`StatusCode`] from one `Variant, code, "Reason";` row per status.
macro_rules! status_codes {
    ($( $variant:ident, $code:literal, $reason:literal; )+) => {
        /// A response status from the IANA registry.
        ///
        /// ```
        /// use canopy::http::StatusCode;
        ///
        /// let status = StatusCode::Ok;
        /// assert_eq!(status.as_u16(), 200);
        /// assert_eq!(status.canonical_reason(), "OK");
        /// assert!(status.is_success());
        /// assert_eq!(StatusCode::from_u16(205), Some(StatusCode::ResetContent));
        /// assert!(StatusCode::NotModified.is_null_body());
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $( $variant = $code, )+
        }

        impl StatusCode {
            pub fn as_u16(self) -> u16 {
                self as u16
            }

            /// `None` for codes outside the registry.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $( Self::$variant => $reason, )+
                }
            }
        }
    };
}

status_codes! {
    // 1xx
    Continue,                       100, "Continue";
    SwitchingProtocols,             101, "Switching Protocols";
    Processing,                     102, "Processing";
    EarlyHints,                     103, "Early Hints";
    // 2xx
    Ok,                             200, "OK";
    Created,                        201, "Created";
    Accepted,                       202, "Accepted";
    NonAuthoritativeInformation,    203, "Non-Authoritative Information";
    NoContent,                      204, "No Content";
    ResetContent,                   205, "Reset Content";
    PartialContent,                 206, "Partial Content";
    MultiStatus,                    207, "Multi-Status";
    AlreadyReported,                208, "Already Reported";
    ImUsed,                         226, "IM Used";
    // 3xx
    MultipleChoices,                300, "Multiple Choices";
    MovedPermanently,               301, "Moved Permanently";
    Found,                          302, "Found";
    SeeOther,                       303, "See Other";
    NotModified,                    304, "Not Modified";
    UseProxy,                       305, "Use Proxy";
    TemporaryRedirect,              307, "Temporary Redirect";
    PermanentRedirect,              308, "Permanent Redirect";
    // 4xx
    BadRequest,                     400, "Bad Request";
    Unauthorized,                   401, "Unauthorized";
    PaymentRequired,                402, "Payment Required";
    Forbidden,                      403, "Forbidden";
    NotFound,                       404, "Not Found";
    MethodNotAllowed,               405, "Method Not Allowed";
    NotAcceptable,                  406, "Not Acceptable";
    ProxyAuthenticationRequired,    407, "Proxy Authentication Required";
    RequestTimeout,                 408, "Request Timeout";
    Conflict,                       409, "Conflict";
    Gone,                           410, "Gone";
    LengthRequired,                 411, "Length Required";
    PreconditionFailed,             412, "Precondition Failed";
    PayloadTooLarge,                413, "Payload Too Large";
    UriTooLong,                     414, "URI Too Long";
    UnsupportedMediaType,           415, "Unsupported Media Type";
    RangeNotSatisfiable,            416, "Range Not Satisfiable";
    ExpectationFailed,              417, "Expectation Failed";
    ImATeapot,                      418, "I'm a teapot";
    MisdirectedRequest,             421, "Misdirected Request";
    UnprocessableEntity,            422, "Unprocessable Entity";
    Locked,                         423, "Locked";
    FailedDependency,               424, "Failed Dependency";
    TooEarly,                       425, "Too Early";
    UpgradeRequired,                426, "Upgrade Required";
    PreconditionRequired,           428, "Precondition Required";
    TooManyRequests,                429, "Too Many Requests";
    RequestHeaderFieldsTooLarge,    431, "Request Header Fields Too Large";
    UnavailableForLegalReasons,     451, "Unavailable For Legal Reasons";
    // 5xx
    InternalServerError,            500, "Internal Server Error";
    NotImplemented,                 501, "Not Implemented";
    BadGateway,                     502, "Bad Gateway";
    ServiceUnavailable,             503, "Service Unavailable";
    GatewayTimeout,                 504, "Gateway Timeout";
    HttpVersionNotSupported,        505, "HTTP Version Not Supported";
    VariantAlsoNegotiates,          506, "Variant Also Negotiates";
    InsufficientStorage,            507, "Insufficient Storage";
    LoopDetected,                   508, "Loop Detected";
    NotExtended,                    510, "Not Extended";
    NetworkAuthenticationRequired,  511, "Network Authentication Required";
}

impl StatusCode {
    /// 101, 204, 205 and 304 never carry a body on the wire.
    pub fn is_null_body(self) -> bool {
        matches!(
            self,
            Self::SwitchingProtocols | Self::NoContent | Self::ResetContent | Self::NotModified
        )
    }

    /// Informational and 2xx codes both count as success.
    pub fn is_success(self) -> bool {
        self.as_u16() < 300
    }

    pub fn is_redirect(self) -> bool {
        self.class() == 3
    }

    pub fn is_client_error(self) -> bool {
        self.class() == 4
    }

    pub fn is_server_error(self) -> bool {
        self.class() == 5
    }

    /// Any 4xx or 5xx.
    pub fn is_error(self) -> bool {
        self.class() >= 4
    }

    fn class(self) -> u16 {
        self.as_u16() / 100
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// Declares [`Method`] with one `Variant => "TOKEN"` row per standard method.
macro_rules! methods {
    ($( $variant:ident => $token:literal ),+ $(,)?) => {
        /// A request method. Tokens are case-sensitive; anything unregistered
        /// is kept verbatim in [`Method::Custom`].
        ///
        /// ```
        /// use canopy::http::Method;
        ///
        /// let method: Method = "GET".parse().unwrap();
        /// assert_eq!(method, Method::Get);
        /// assert_eq!(method.as_str(), "GET");
        /// assert!(method.is_safe());
        /// assert_eq!("PURGE".parse::<Method>().unwrap(), Method::Custom("PURGE".into()));
        /// ```
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Method {
            $( $variant, )+
            Custom(String),
        }

        impl Method {
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $token, )+
                    Self::Custom(token) => token,
                }
            }
        }

        impl std::str::FromStr for Method {
            type Err = std::convert::Infallible;

            fn from_str(token: &str) -> Result<Self, Self::Err> {
                Ok(match token {
                    $( $token => Self::$variant, )+
                    other => Self::Custom(other.to_owned()),
                })
            }
        }
    };
}

methods! {
    Get => "GET",
    Post => "POST",
    Put => "PUT",
    Delete => "DELETE",
    Head => "HEAD",
    Options => "OPTIONS",
    Patch => "PATCH",
    Connect => "CONNECT",
    Trace => "TRACE",
}

impl Method {
    /// RFC 9110 §9.2.1: GET, HEAD, OPTIONS and TRACE.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }

    /// RFC 9110 §9.2.2: the safe methods plus PUT and DELETE.
    pub fn is_idempotent(&self) -> bool {
        self.is_safe() || matches!(self, Self::Put | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
