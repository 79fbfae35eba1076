/// UUID v7 の ID 型を定義する
///
/// 書式設定・ロット・コードレコード・操作者の ID はすべて同じ形をしている。
/// 生成順に並ぶ v7 を使うので、ロットやコードを ID 順に並べても作成順になる。
///
/// 生成されるもの: `new()`（v7 で採番）、`from_uuid()`（DB からの復元）、
/// `as_uuid()`（バインド用）、`Default`、および serde では UUID 文字列そのものとして扱う
/// `Serialize` / `Deserialize`。
///
/// ```rust
/// use ludo_domain::barcode::LotId;
///
/// let id = LotId::new();
/// assert_eq!(LotId::from_uuid(*id.as_uuid()), id);
/// ```
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        $vis struct $Name(uuid::Uuid);

        impl $Name {
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
