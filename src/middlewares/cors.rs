use actix_cors::Cors;

pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| {
            // widget 嵌在任意商户站点上, 无法预先枚举来源域名
            true
        })
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        // 放宽自定义 Header, 防止 widget 端预检失败
        .allow_any_header()
        // 会话 cookie 需要跨站携带
        .supports_credentials()
        .max_age(3600)
}
