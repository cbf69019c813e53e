//! Download failures. `Display` is the text shown to the user.

use thiserror::Error;

/// Errors that can occur while fetching media.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Instagram havolasini tushunib bo'lmadi.")]
    InvalidInstagramUrl,

    #[error("Instagram bilan bog'lanib bo'lmadi.")]
    InstagramUnreachable,

    #[error("Instagram havolasi topilmadi yoki o'chirilgan.")]
    InstagramNotFound,

    #[error("Instagram ma'lumotlarini olishda xato yuz berdi.")]
    InstagramPayload,

    #[error("Post tarkibida media topilmadi.")]
    MediaMissing,

    #[error("TikTok videosini olishda xato yuz berdi.")]
    TikTokService,

    #[error("SSStik javobidan video havolasi topilmadi.")]
    TikTokNoLink,

    #[error("SSStik bo'sh video qaytardi.")]
    TikTokEmptyFile,

    #[error("Media faylini yuklab olishda xato yuz berdi.")]
    FileTransfer,

    #[error("Media haqida ma'lumot olinmadi.")]
    NoMetadata,

    #[error("Yuklab olingan fayl topilmadi.")]
    OutputMissing,

    #[error("TikTok serveri juda sekin javob bermoqda. Birozdan so'ng qayta urinib ko'ring.")]
    SlowServer,

    #[error("Video yuklab olib bo'lmadi. Havolani tekshiring.")]
    ExtractorFailed,

    #[error("Yuklab olish juda uzoq davom etdi. Keyinroq qayta urinib ko'ring.")]
    TimedOut,

    #[error("Videoni telegram uchun tayyorlashda xato yuz berdi.")]
    Transcode,

    #[error("Kutilmagan xato yuz berdi. Keyinroq urinib ko'ring.")]
    Unexpected,
}

impl DownloadError {
    /// Maps extractor diagnostics to the message the user should see.
    #[must_use]
    pub fn from_extractor_output(stderr: &str) -> Self {
        if stderr.to_lowercase().contains("handshake operation timed out") {
            Self::SlowServer
        } else {
            Self::ExtractorFailed
        }
    }
}
