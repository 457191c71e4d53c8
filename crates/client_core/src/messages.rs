use std::str::FromStr;

use crate::todos::SyncAction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Ko,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en_us" => Ok(Self::En),
            "ko" | "ko-kr" | "ko_kr" => Ok(Self::Ko),
            other => Err(format!("unsupported locale '{other}'")),
        }
    }
}

/// Fixed user-facing strings. Backend detail never ends up in these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Messages {
    locale: Locale,
}

impl Messages {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    fn pick(&self, en: &str, ko: &str) -> String {
        match self.locale {
            Locale::En => en.to_string(),
            Locale::Ko => ko.to_string(),
        }
    }

    pub fn authentication_required(&self) -> String {
        self.pick("Sign-in required.", "로그인이 필요합니다.")
    }

    pub fn sign_in_to_view(&self) -> String {
        self.pick(
            "Sign in to see your to-do list.",
            "할 일 목록을 보려면 로그인이 필요합니다.",
        )
    }

    pub fn action_failed(&self, action: SyncAction) -> String {
        match action {
            SyncAction::Fetch => self.pick(
                "Failed to fetch the to-do list.",
                "할 일 목록을 가져오는 중 오류가 발생했습니다.",
            ),
            SyncAction::Add => self.pick(
                "Failed to add the to-do.",
                "할 일을 추가하는 중 오류가 발생했습니다.",
            ),
            SyncAction::Update => self.pick(
                "Failed to update the to-do.",
                "할 일 상태를 변경하는 중 오류가 발생했습니다.",
            ),
            SyncAction::Delete => self.pick(
                "Failed to delete the to-do.",
                "할 일을 삭제하는 중 오류가 발생했습니다.",
            ),
        }
    }

    pub fn empty_title(&self) -> String {
        self.pick("Enter a to-do first.", "새 할 일을 입력하세요.")
    }

    pub fn unknown_item(&self) -> String {
        self.pick("That to-do is not in the list.", "해당 할 일을 찾을 수 없습니다.")
    }

    pub fn session_changed(&self) -> String {
        self.pick(
            "The session changed before the request finished.",
            "요청이 끝나기 전에 로그인 상태가 바뀌었습니다.",
        )
    }

    pub fn empty_list(&self) -> String {
        self.pick("Nothing to do.", "할 일이 없습니다.")
    }

    pub fn loading(&self) -> String {
        self.pick("Loading...", "로딩 중...")
    }

    pub fn sign_in_succeeded(&self) -> String {
        self.pick("Signed in!", "로그인 성공!")
    }

    pub fn sign_in_failed(&self) -> String {
        self.pick("Sign-in failed.", "로그인 중 오류가 발생했습니다.")
    }

    pub fn credentials_required(&self) -> String {
        self.pick(
            "Enter both email and password.",
            "이메일과 비밀번호를 입력하세요.",
        )
    }

    pub fn email_required(&self) -> String {
        self.pick("Enter your email first.", "이메일을 입력하세요.")
    }

    pub fn password_reset_sent(&self) -> String {
        self.pick(
            "A password reset email has been sent.",
            "비밀번호 재설정 이메일이 발송되었습니다.",
        )
    }

    pub fn password_reset_failed(&self) -> String {
        self.pick(
            "Password reset request failed.",
            "비밀번호 재설정 요청 중 오류가 발생했습니다.",
        )
    }

    pub fn sign_out_failed(&self) -> String {
        self.pick("Sign-out failed.", "로그아웃 중 오류가 발생했습니다.")
    }
}
